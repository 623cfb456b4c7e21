//! Errors the linker can report, each tagged with the error code a user can
//! feed to `ez80ld --explain`.

use ez80_errors::error;

error! {
    /// Everything that can go wrong while linking a set of objects and
    /// libraries into one output file.
    pub enum Error {
        #[code = E010]
        #[message = "I could not open an object file, archive, or library."]
        #[formatted_message("{0}")]
        #[help = "Check that the path exists and is readable from the current directory."]
        CannotOpenFile(String),

        #[code = E011]
        #[message = "I could not write the output file."]
        #[formatted_message("{0}")]
        #[help = "Check that the output path is writable."]
        CannotWriteOutput(String),

        #[code = E002]
        #[message = "No object files were given to link."]
        #[formatted_message("{0}")]
        #[help = "Pass at least one object file on the command line."]
        NoInputFiles(String),

        #[code = E060]
        #[message = "Two objects export the same symbol name."]
        #[formatted_message("{0}")]
        #[help = "Only one object may define a given exported symbol; rename one or remove the duplicate."]
        DuplicateExport(String),

        #[code = E061]
        #[message = "A referenced external symbol was never defined anywhere in the link."]
        #[formatted_message("{0}")]
        #[help = "Define the symbol in one of the linked objects, or link the library that provides it."]
        UndefinedSymbol(String),

        #[code = E062]
        #[message = "This is not a valid eZ80 object file."]
        #[formatted_message("{0}")]
        #[help = "The file does not start with the `EZ8O` magic bytes; check it was produced by this toolchain."]
        BadMagic(String),

        #[code = E063]
        #[message = "This object file's version is not one this linker understands."]
        #[formatted_message("{0}")]
        #[help = "Reassemble the source with a matching version of the assembler."]
        UnsupportedVersion(String),

        #[code = E064]
        #[message = "A library member has an inconsistent or truncated layout."]
        #[formatted_message("{0}")]
        #[help = "The archive may be corrupt or was not produced by concatenating whole object files."]
        BadArchiveMember(String),

        #[transparent]
        Io(#[from] std::io::Error),
    }
}
