//! The linker's configuration: its input files, library search path, and
//! output options. This doubles as the linker's command-line surface; the
//! `ez80ld` binary builds one of these directly from its parsed arguments.

use std::path::PathBuf;

use crate::Linker;

/// Everything the linker needs to know before it starts loading objects.
#[derive(Debug)]
pub struct Configuration {
    pub(crate) object_files: Vec<PathBuf>,
    pub(crate) library_names: Vec<String>,
    pub(crate) library_dirs: Vec<PathBuf>,
    pub(crate) base_address: u32,
    pub(crate) output_file: PathBuf,
    pub(crate) map_file: Option<PathBuf>,
}

impl Configuration {
    /// Creates a configuration for linking `object_files`, with every other
    /// option at its default: base address `0`, output `a.out`, no map
    /// file, no libraries.
    pub fn new(object_files: Vec<PathBuf>) -> Self {
        Self {
            object_files,
            library_names: Vec::new(),
            library_dirs: Vec::new(),
            base_address: 0,
            output_file: PathBuf::from("a.out"),
            map_file: None,
        }
    }

    /// Declares `-l name` library references, resolved against
    /// [`Self::with_library_dirs`] as `lib<name>.a`, falling back to `name`
    /// itself as a literal path.
    pub fn with_library_names(mut self, library_names: Vec<String>) -> Self {
        self.library_names = library_names;
        self
    }

    /// Declares `-L dir` search directories, consulted in order.
    pub fn with_library_dirs(mut self, library_dirs: Vec<PathBuf>) -> Self {
        self.library_dirs = library_dirs;
        self
    }

    /// Sets the base address every section is laid out from. Default
    /// `0x000000`.
    pub fn with_base_address(mut self, base_address: u32) -> Self {
        self.base_address = base_address;
        self
    }

    /// Sets the output file path. Default `a.out`.
    pub fn with_output_file(mut self, output_file: PathBuf) -> Self {
        self.output_file = output_file;
        self
    }

    /// Requests a map file be written alongside the output.
    pub fn with_map_file(mut self, map_file: Option<PathBuf>) -> Self {
        self.map_file = map_file;
        self
    }

    /// Builds the linker driver for this configuration.
    pub fn linker(self) -> Linker {
        Linker::with_configuration(self)
    }
}
