//! `ez80_dump` reads eZ80 object files and prints their header, section
//! contents, and symbol/relocation/extern/string tables in a human-readable
//! form — the library behind the `ez80objdump` binary.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

pub mod error;
mod image;
mod printer;

use std::{fs, io::Write, path::Path};

pub use image::ObjectImage;

use crate::error::Error;

/// Reads `path`, parses it as an object file, and writes its dump to `out`.
pub fn dump_file(path: &Path, out: &mut impl Write) -> Result<(), Error> {
    let bytes = fs::read(path).map_err(|source| Error::CannotOpenFile(format!("{}: {source}", path.display())))?;
    log::debug!("read {} ({} bytes)", path.display(), bytes.len());
    let image = ObjectImage::parse(path, &bytes)?;
    printer::dump(out, path, &image)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_file_reports_missing_file() {
        let mut out = Vec::new();
        let result = dump_file(Path::new("/nonexistent/path/to/object.o"), &mut out);
        assert!(result.is_err());
    }
}
