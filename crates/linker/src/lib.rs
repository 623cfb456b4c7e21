//! `ez80_linker` links eZ80 object files and archives produced by the
//! assembler into a flat binary: it selectively pulls in library members,
//! lays out CODE/DATA/BSS across every loaded object, promotes symbols from
//! section-relative to absolute, and patches every `ADDR24` relocation.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod configuration;
pub mod error;
mod linker;
mod object;
mod symtab;

pub use configuration::Configuration;
pub use linker::Linker;
