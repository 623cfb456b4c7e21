//! `ez80objdump` prints the header, sections, and tables of one or more
//! eZ80 object files.

use std::{io::stdout, path::PathBuf, process};

use argh::FromArgs;
use ez80_cli::{collect_arguments, error::Error, init_logging};
use miette::Result;

/// `ez80objdump` prints the contents of eZ80 object files.
#[derive(Debug, FromArgs)]
struct Ez80Objdump {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// raise the log verbosity to `debug`.
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// the object files to dump.
    #[argh(positional)]
    files: Vec<PathBuf>,
}

impl Ez80Objdump {
    fn new() -> Result<Self, Error> {
        let (arguments, command) = collect_arguments()?;
        let arguments = arguments.iter().skip(1).map(String::as_str).collect::<Vec<_>>();

        match Ez80Objdump::from_args(&[&command], &arguments) {
            Ok(objdump) => Ok(objdump),
            Err(early_exit) => match early_exit.status {
                Ok(()) => {
                    println!("{}", early_exit.output);
                    process::exit(0);
                }
                Err(()) => Err(Error::CommandLine(early_exit.output.trim().to_string())),
            },
        }
    }
}

fn main() -> Result<()> {
    Error::install_and_configure("ez80objdump")?;

    let objdump = Ez80Objdump::new()?;

    init_logging(objdump.verbose, "ez80_dump");

    if let Some(error_code) = objdump.explain {
        println!("{}", Error::explain(&error_code)?);

        return Ok(());
    }

    if objdump.files.is_empty() {
        return Err(Error::NoInputFiles.into());
    }

    let mut stdout = stdout().lock();

    for (index, file) in objdump.files.iter().enumerate() {
        if index > 0 {
            println!();
        }

        ez80_dump::dump_file(file, &mut stdout)?;
    }

    Ok(())
}
