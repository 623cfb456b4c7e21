//! Errors `ez80objdump` can report, each tagged with the error code a user
//! can feed to `--explain`.

use ez80_errors::error;

error! {
    /// Everything that can go wrong while reading and printing an object file.
    pub enum Error {
        #[code = E010]
        #[message = "I could not open an object file."]
        #[formatted_message("{0}")]
        #[help = "Check that the path exists and is readable from the current directory."]
        CannotOpenFile(String),

        #[code = E062]
        #[message = "This is not a valid eZ80 object file."]
        #[formatted_message("{0}")]
        #[help = "The file does not start with the `EZ8O` magic bytes; check it was produced by this toolchain."]
        BadMagic(String),

        #[code = E063]
        #[message = "This object file's version is not one this tool understands."]
        #[formatted_message("{0}")]
        #[help = "Reassemble the source with a matching version of the assembler."]
        UnsupportedVersion(String),

        #[code = E064]
        #[message = "This object file has an inconsistent or truncated layout."]
        #[formatted_message("{0}")]
        #[help = "The file may be corrupt, or was not produced by this toolchain."]
        Truncated(String),

        #[transparent]
        Io(#[from] std::io::Error),
    }
}
