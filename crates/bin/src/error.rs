#[cfg(feature = "fancy-errors")]
use miette::{set_hook, MietteHandlerOpts};
use miette::{Diagnostic, InstallError, Result};
use thiserror::Error;

/// Errors shared by all three binaries' command-line handling, independent
/// of whatever each one does once its arguments are parsed.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// An argument wasn't valid Unicode, so `argh` can't see it.
    #[error("The argument `{0}` contains invalid Unicode data.")]
    InvalidArgumentEncoding(String),

    /// `env::args_os()` yielded nothing at all, not even argv[0].
    #[error("The program name is missing from the command-line.")]
    ProgramNameIsMissing,

    /// `argh` rejected the arguments outright (unknown flag, missing value).
    #[error("I was not able to read the command-line properly:\n{0}")]
    #[diagnostic(code(E001), help("See the command-line usage with `--help`."))]
    CommandLine(String),

    /// No input files were named on the command-line.
    #[error("No input files were given.")]
    #[diagnostic(code(E002))]
    NoInputFiles,
}

impl Error {
    /// Installs the `miette` rendering hook, with a footer pointing at
    /// `<program> --explain <code>` for further detail on a diagnostic code.
    pub fn install_and_configure(program: &str) -> Result<(), InstallError> {
        #[cfg(feature = "fancy-errors")]
        set_hook(Box::new(move |_| {
            Box::new(
                MietteHandlerOpts::new()
                    .with_cause_chain()
                    .footer(format!(
                        "For more information about an error, try \
                        `{program} --explain <error>` where `<error>` \
                        has the `E[0-9]{{3}}` pattern."
                    ))
                    .width(85)
                    .terminal_links(false)
                    .build(),
            )
        }))?;

        #[cfg(not(feature = "fancy-errors"))]
        let _ = program;

        Ok(())
    }

    /// Looks up the help text registered for `error_code`.
    pub fn explain(error_code: &str) -> Result<&'static str, ez80_errors::Error> {
        ez80_errors::Error::explain(error_code)
    }
}
