//! The linking driver: loads objects and libraries, selectively pulls in
//! archive members that satisfy unresolved externals, lays out CODE/DATA/BSS
//! across every loaded object, promotes symbols to absolute addresses, and
//! patches every relocation.

use std::{
    collections::HashSet,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use ez80_object::format::{RelocationTarget, Section};

use crate::{
    configuration::Configuration,
    error::Error,
    object::{scan_archive, ArchiveMember, ObjectImage},
    symtab::{GlobalSymbolTable, Origin},
};

/// A library archive, scanned once into member ranges but kept in memory so
/// a selected member can be parsed without reopening the file.
struct Library {
    path: PathBuf,
    bytes: Vec<u8>,
    members: Vec<ArchiveMember>,
}

/// The linker driver, built from a [`Configuration`].
#[derive(Debug)]
pub struct Linker {
    configuration: Configuration,
}

impl Linker {
    pub(crate) fn with_configuration(configuration: Configuration) -> Self {
        Self { configuration }
    }

    /// Links the configured objects and libraries, writing the output
    /// binary (and, if requested, a map file).
    pub fn link(self) -> Result<(), Error> {
        let config = &self.configuration;

        if config.object_files.is_empty() {
            return Err(Error::NoInputFiles("pass at least one object file to link".to_owned()));
        }

        let mut objects = Vec::new();
        let mut globals = GlobalSymbolTable::new();

        for path in &config.object_files {
            let image = load_object(path)?;
            register_exports(&mut globals, &image, objects.len())?;
            log::debug!(
                "loaded '{}': code={}, data={}, bss={}",
                path.display(),
                image.code.len(),
                image.data.len(),
                image.bss_size
            );
            objects.push(image);
        }

        let mut libraries = Vec::new();
        for name in &config.library_names {
            let path = resolve_library(name, &config.library_dirs)?;
            let bytes = fs::read(&path)
                .map_err(|source| Error::CannotOpenFile(format!("{}: {source}", path.display())))?;
            let members = scan_archive(&path, &bytes)?;
            log::debug!("scanned library '{}': {} object(s)", path.display(), members.len());
            libraries.push(Library { path, bytes, members });
        }

        process_libraries(&mut objects, &mut globals, &mut libraries)?;

        let unresolved = collect_unresolved(&objects, &globals);
        if let Some(name) = unresolved.into_iter().next() {
            return Err(Error::UndefinedSymbol(format!(
                "`{name}` is referenced but defined in no linked object or library"
            )));
        }

        let base = config.base_address;
        let (total_code, total_data, total_bss) = layout(&mut objects, base);
        promote_to_absolute(&mut objects, &mut globals)?;
        define_linker_symbols(&mut globals, base, total_code, total_data, total_bss)?;

        log::debug!(
            "layout: CODE={:06X}-{:06X}, DATA={:06X}-{:06X}, BSS={:06X}-{:06X}",
            base,
            base + total_code.saturating_sub(1),
            base + total_code,
            base + total_code + total_data.saturating_sub(1),
            base + total_code + total_data,
            base + total_code + total_data + total_bss.saturating_sub(1),
        );

        let (code_buf, data_buf) = patch(&objects, &globals, base, total_code, total_data)?;

        let mut output = Vec::with_capacity(code_buf.len() + data_buf.len());
        output.extend_from_slice(&code_buf);
        output.extend_from_slice(&data_buf);
        fs::write(&config.output_file, &output)
            .map_err(|source| Error::CannotWriteOutput(format!("{}: {source}", config.output_file.display())))?;

        log::info!("wrote '{}' ({} bytes)", config.output_file.display(), output.len());

        if let Some(map_file) = &config.map_file {
            write_map(map_file, &objects, &globals, base, total_code, total_data, total_bss)?;
            log::debug!("wrote map file '{}'", map_file.display());
        }

        Ok(())
    }
}

fn load_object(path: &Path) -> Result<ObjectImage, Error> {
    let bytes = fs::read(path).map_err(|source| Error::CannotOpenFile(format!("{}: {source}", path.display())))?;
    ObjectImage::parse(path, &bytes)
}

fn register_exports(globals: &mut GlobalSymbolTable, image: &ObjectImage, obj_index: usize) -> Result<(), Error> {
    for symbol in &image.symbols {
        if let Some(name) = image.symbol_name(symbol) {
            globals.define(name, symbol.value.get(), symbol.section, Origin::Object(obj_index))?;
        }
    }
    Ok(())
}

/// Resolves a `-l name` reference to `libname.a` in each search directory,
/// in order, falling back to `name` itself as a literal path.
fn resolve_library(name: &str, dirs: &[PathBuf]) -> Result<PathBuf, Error> {
    for dir in dirs {
        let candidate = dir.join(format!("lib{name}.a"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let literal = PathBuf::from(name);
    if literal.is_file() {
        return Ok(literal);
    }

    Err(Error::CannotOpenFile(format!("cannot find library '{name}'")))
}

/// Collects every `EXTERN` name referenced by a loaded object that the
/// global symbol table does not yet define.
fn collect_unresolved(objects: &[ObjectImage], globals: &GlobalSymbolTable) -> HashSet<String> {
    let mut unresolved = HashSet::new();

    for object in objects {
        for extern_record in &object.externs {
            if let Some(name) = object.extern_name(extern_record) {
                if globals.find(name).is_none() {
                    unresolved.insert(name.to_owned());
                }
            }
        }
    }

    unresolved
}

/// Repeatedly scans every unloaded library member for one that defines a
/// currently-unresolved symbol, loading it and registering its exports, until
/// an entire pass loads nothing new.
fn process_libraries(
    objects: &mut Vec<ObjectImage>,
    globals: &mut GlobalSymbolTable,
    libraries: &mut [Library],
) -> Result<(), Error> {
    loop {
        let unresolved = collect_unresolved(objects, globals);
        if unresolved.is_empty() {
            break;
        }

        let mut loaded_any = false;

        for library in libraries.iter_mut() {
            for member in library.members.iter_mut() {
                if member.loaded {
                    continue;
                }

                let slice = &library.bytes[member.offset..member.offset + member.length];
                let image = ObjectImage::parse(&library.path, slice)?;

                if image.export_names().any(|name| unresolved.contains(name)) {
                    member.loaded = true;
                    log::debug!("loading from library '{}' (object at {})", library.path.display(), member.offset);
                    register_exports(globals, &image, objects.len())?;
                    objects.push(image);
                    loaded_any = true;
                }
            }
        }

        if !loaded_any {
            break;
        }
    }

    Ok(())
}

/// Assigns `code_base`/`data_base`/`bss_base` to every object, concatenating
/// CODE, then DATA, then BSS across objects in load order. Returns the total
/// size of each section.
fn layout(objects: &mut [ObjectImage], base: u32) -> (u32, u32, u32) {
    let mut addr = base;
    for object in objects.iter_mut() {
        object.code_base = addr;
        addr += object.code.len() as u32;
    }
    let total_code = addr - base;

    let data_start = addr;
    for object in objects.iter_mut() {
        object.data_base = addr;
        addr += object.data.len() as u32;
    }
    let total_data = addr - data_start;

    let bss_start = addr;
    for object in objects.iter_mut() {
        object.bss_base = addr;
        addr += object.bss_size;
    }
    let total_bss = addr - bss_start;

    (total_code, total_data, total_bss)
}

/// Adds each object's section base to every global symbol it defines,
/// turning section-relative values into absolute addresses.
fn promote_to_absolute(objects: &[ObjectImage], globals: &mut GlobalSymbolTable) -> Result<(), Error> {
    for symbol in globals.iter_mut() {
        let Origin::Object(index) = symbol.origin else { continue };
        let object = &objects[index];

        let section_base = match symbol.section {
            Section::Code => object.code_base,
            Section::Data => object.data_base,
            Section::Bss => object.bss_base,
            Section::Abs => 0,
        };

        symbol.value = symbol.value.wrapping_add(section_base) & 0x00FF_FFFF;
    }

    Ok(())
}

fn define_linker_symbols(
    globals: &mut GlobalSymbolTable,
    base: u32,
    total_code: u32,
    total_data: u32,
    total_bss: u32,
) -> Result<(), Error> {
    globals.define("__low_code", base, Section::Abs, Origin::Linker)?;
    globals.define("__len_code", total_code, Section::Abs, Origin::Linker)?;
    globals.define("__low_data", base + total_code, Section::Abs, Origin::Linker)?;
    globals.define("__len_data", total_data, Section::Abs, Origin::Linker)?;
    globals.define("__low_bss", base + total_code + total_data, Section::Abs, Origin::Linker)?;
    globals.define("__len_bss", total_bss, Section::Abs, Origin::Linker)?;
    Ok(())
}

/// Copies every object's CODE and DATA bytes into the output buffers and
/// patches every relocation's 24-bit slot in place.
fn patch(
    objects: &[ObjectImage],
    globals: &GlobalSymbolTable,
    base: u32,
    total_code: u32,
    total_data: u32,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let mut code_buf = vec![0u8; total_code as usize];
    let mut data_buf = vec![0u8; total_data as usize];

    for object in objects {
        let code_offset = (object.code_base - base) as usize;
        code_buf[code_offset..code_offset + object.code.len()].copy_from_slice(&object.code);

        let data_offset = (object.data_base - base - total_code) as usize;
        data_buf[data_offset..data_offset + object.data.len()].copy_from_slice(&object.data);
    }

    for object in objects {
        for reloc in &object.relocations {
            let target_addr = match reloc.target {
                RelocationTarget::External => {
                    let extern_record = object.externs.get(reloc.ext_index as usize).ok_or_else(|| {
                        Error::UndefinedSymbol(format!(
                            "{}: relocation references extern index {} which does not exist",
                            object.path.display(),
                            reloc.ext_index
                        ))
                    })?;
                    let name = object.extern_name(extern_record).ok_or_else(|| {
                        Error::BadArchiveMember(format!("{}: extern name offset out of range", object.path.display()))
                    })?;
                    globals
                        .find(name)
                        .ok_or_else(|| {
                            Error::UndefinedSymbol(format!(
                                "`{name}` referenced in '{}' has no definition",
                                object.path.display()
                            ))
                        })?
                        .value
                }
                RelocationTarget::Code => object.code_base,
                RelocationTarget::Data => object.data_base,
                RelocationTarget::Bss => object.bss_base,
            };

            let (buffer, patch_offset) = match reloc.section {
                Section::Code => (&mut code_buf, (object.code_base - base) as usize + reloc.offset.get() as usize),
                Section::Data => {
                    (&mut data_buf, (object.data_base - base - total_code) as usize + reloc.offset.get() as usize)
                }
                Section::Bss | Section::Abs => {
                    return Err(Error::BadArchiveMember(format!(
                        "{}: a relocation's own section must be CODE or DATA",
                        object.path.display()
                    )))
                }
            };

            let existing = u32::from(buffer[patch_offset])
                | (u32::from(buffer[patch_offset + 1]) << 8)
                | (u32::from(buffer[patch_offset + 2]) << 16);
            let patched = target_addr.wrapping_add(existing) & 0x00FF_FFFF;

            log::trace!(
                "{}: patched {:?} offset {:06X}: {:06X} -> {:06X}",
                object.path.display(),
                reloc.section,
                reloc.offset.get(),
                existing,
                patched,
            );

            buffer[patch_offset] = (patched & 0xFF) as u8;
            buffer[patch_offset + 1] = ((patched >> 8) & 0xFF) as u8;
            buffer[patch_offset + 2] = ((patched >> 16) & 0xFF) as u8;
        }
    }

    Ok((code_buf, data_buf))
}

#[allow(clippy::too_many_arguments)]
fn write_map(
    path: &Path,
    objects: &[ObjectImage],
    globals: &GlobalSymbolTable,
    base: u32,
    total_code: u32,
    total_data: u32,
    total_bss: u32,
) -> Result<(), Error> {
    let mut out = String::new();

    writeln!(out, "eZ80 Linker Map File").unwrap();
    writeln!(out, "====================\n").unwrap();

    writeln!(out, "Memory Layout:").unwrap();
    writeln!(out, "  CODE: {base:06X} - {:06X} ({total_code} bytes)", base + total_code.saturating_sub(1)).unwrap();
    writeln!(
        out,
        "  DATA: {:06X} - {:06X} ({total_data} bytes)",
        base + total_code,
        base + total_code + total_data.saturating_sub(1)
    )
    .unwrap();
    writeln!(
        out,
        "  BSS:  {:06X} - {:06X} ({total_bss} bytes)\n",
        base + total_code + total_data,
        base + total_code + total_data + total_bss.saturating_sub(1)
    )
    .unwrap();

    writeln!(out, "Object Files:").unwrap();
    for object in objects {
        writeln!(out, "  {}", object.path.display()).unwrap();
        writeln!(out, "    CODE: {:06X} ({} bytes)", object.code_base, object.code.len()).unwrap();
        writeln!(out, "    DATA: {:06X} ({} bytes)", object.data_base, object.data.len()).unwrap();
        writeln!(out, "    BSS:  {:06X} ({} bytes)", object.bss_base, object.bss_size).unwrap();
    }
    writeln!(out).unwrap();

    writeln!(out, "Symbols:").unwrap();
    writeln!(out, "  {:<24} {:<8} {}", "Name", "Address", "Object").unwrap();
    writeln!(out, "  {:<24} {:<8} {}", "----", "-------", "------").unwrap();
    for symbol in globals.iter() {
        let origin = match symbol.origin {
            Origin::Linker => "(linker)".to_owned(),
            Origin::Object(index) => objects[index].path.display().to_string(),
        };
        writeln!(out, "  {:<24} {:06X}   {origin}", symbol.name, symbol.value).unwrap();
    }

    fs::write(path, out).map_err(|source| Error::CannotWriteOutput(format!("{}: {source}", path.display())))
}
