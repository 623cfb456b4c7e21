//! Shared plumbing for the `ez80asm`, `ez80ld`, and `ez80objdump` binaries:
//! the argument-collection dance `argh` needs and the `miette` error hook.

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

use std::{env, ffi::OsString, path::Path};

use error::Error;

/// Collects `env::args_os()` into UTF-8 strings and splits off the program
/// name, returning it alongside the rest of the arguments. Every binary's
/// `from_args`-based CLI parsing starts here.
pub fn collect_arguments() -> Result<(Vec<String>, String), Error> {
    let arguments = env::args_os()
        .map(OsString::into_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|argument| Error::InvalidArgumentEncoding(argument.to_string_lossy().to_string()))?;

    if arguments.is_empty() {
        return Err(Error::ProgramNameIsMissing);
    }

    let command = Path::new(&arguments[0])
        .file_name()
        .and_then(|file_name| file_name.to_str())
        .unwrap_or(&arguments[0])
        .to_owned();

    Ok((arguments, command))
}

/// Initializes `env_logger` at debug level for this crate's modules when
/// `-v` was passed, otherwise leaves logging off.
pub fn init_logging(verbose: bool, crate_name: &str) {
    if verbose {
        env_logger::builder().filter_module(crate_name, log::LevelFilter::Debug).init();
    }
}
