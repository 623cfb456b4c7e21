//! `ez80ld` links eZ80 object files and libraries into one output image.

use std::{path::PathBuf, process};

use argh::FromArgs;
use ez80_cli::{collect_arguments, error::Error, init_logging};
use ez80_linker::Configuration;
use miette::Result;

fn parse_hex_base(value: &str) -> Result<u32, String> {
    u32::from_str_radix(value.trim_start_matches("0x").trim_start_matches("0X"), 16)
        .map_err(|source| format!("`{value}` is not a valid hexadecimal base address: {source}"))
}

/// `ez80ld` links eZ80 object files and libraries into one output image.
#[derive(Debug, FromArgs)]
struct Ez80Ld {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// raise the log verbosity to `debug`.
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// specify the name and location of the output file. If not specified,
    /// `a.out` is used.
    #[argh(option, short = 'o', default = "PathBuf::from(\"a.out\")")]
    output_file: PathBuf,

    /// the base address every section is laid out from, in hexadecimal.
    #[argh(option, short = 'b', from_str_fn(parse_hex_base), default = "0")]
    base_address: u32,

    /// write a map file listing every symbol's final address.
    #[argh(option, short = 'm')]
    map_file: Option<PathBuf>,

    /// add `dir` to the library search path.
    #[argh(option, short = 'L')]
    library_dir: Vec<PathBuf>,

    /// link against `lib<name>.a`, searched for along the library path.
    #[argh(option, short = 'l')]
    library: Vec<String>,

    /// the object files and archives to link.
    #[argh(positional)]
    object_files: Vec<PathBuf>,
}

impl Ez80Ld {
    fn new() -> Result<Self, Error> {
        let (arguments, command) = collect_arguments()?;
        let arguments = arguments.iter().skip(1).map(String::as_str).collect::<Vec<_>>();

        match Ez80Ld::from_args(&[&command], &arguments) {
            Ok(ld) => Ok(ld),
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
    Error::install_and_configure("ez80ld")?;

    let ld = Ez80Ld::new()?;

    init_logging(ld.verbose, "ez80_linker");

    if let Some(error_code) = ld.explain {
        println!("{}", Error::explain(&error_code)?);

        return Ok(());
    }

    let linker = Configuration::new(ld.object_files)
        .with_library_names(ld.library)
        .with_library_dirs(ld.library_dir)
        .with_base_address(ld.base_address)
        .with_output_file(ld.output_file)
        .with_map_file(ld.map_file)
        .linker();

    linker.link()?;

    Ok(())
}
