//! `ez80asm` assembles a single eZ80 ADL-mode source file into an object
//! file.

use std::{path::PathBuf, process};

use argh::FromArgs;
use ez80_cli::{collect_arguments, error::Error, init_logging};
use miette::Result;

/// `ez80asm` assembles an eZ80 ADL-mode source file into an object file.
#[derive(Debug, FromArgs)]
struct Ez80Asm {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// raise the log verbosity to `debug`.
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// specify the name and location of the output file. If not specified,
    /// the input file's name with a `.o` extension is used.
    #[argh(option, short = 'o')]
    output_file: Option<PathBuf>,

    /// the source file to assemble.
    #[argh(positional)]
    input_file: Option<PathBuf>,
}

impl Ez80Asm {
    fn new() -> Result<Self, Error> {
        let (arguments, command) = collect_arguments()?;
        let arguments = arguments.iter().skip(1).map(String::as_str).collect::<Vec<_>>();

        match Ez80Asm::from_args(&[&command], &arguments) {
            Ok(asm) => Ok(asm),
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
    Error::install_and_configure("ez80asm")?;

    let asm = Ez80Asm::new()?;

    init_logging(asm.verbose, "ez80_asm");

    if let Some(error_code) = asm.explain {
        println!("{}", Error::explain(&error_code)?);

        return Ok(());
    }

    let Some(input_file) = asm.input_file else {
        return Err(Error::NoInputFiles.into());
    };

    let output_file = asm.output_file.unwrap_or_else(|| input_file.with_extension("o"));

    ez80_asm::Assembler::new().assemble_to(&input_file, &output_file)?;

    Ok(())
}
