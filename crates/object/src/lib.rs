//! `ez80_object` reads and writes the eZ80 toolchain's object file format: the
//! contract between the assembler, the linker, and the object dumper.
//!
//! The format is always 24-bit little-endian (there is no eZ80 big-endian
//! variant), so unlike a general-purpose object file crate this one does not
//! parameterize its readers over an endianness. It still follows the same
//! `Read`/`Write` trait split and `nom`-combinator reading style used
//! throughout this toolchain's object handling.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod combinators;
pub mod format;
mod read_write;
mod u24;

pub use format::*;
pub use read_write::{Read, Write};
pub use u24::U24;

/// Represents the input type of the parsers.
pub type Input<'a> = &'a [u8];

/// Represents the result returned by the parsers.
pub type Result<'a, O, E> = nom::IResult<Input<'a>, O, E>;

/// Errors used by the crate.
pub mod errors {
    pub use nom::Err as Error;

    /// An error that doesn't accumulate multiple errors, but stores just one.
    pub type SingleError<'a> = nom::error::Error<super::Input<'a>>;

    pub use nom::error::ErrorKind;
}
