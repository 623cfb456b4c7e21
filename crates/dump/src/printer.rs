//! Renders a parsed [`ObjectImage`] the way `ez80objdump` prints it: header
//! fields, a hex-and-ASCII dump of CODE and DATA, then the symbol,
//! relocation, extern, and string tables.

use std::io::{self, Write};

use ez80_object::format::{RelocationTarget, Section, SymbolFlags};

use crate::image::ObjectImage;

fn section_name(section: Section) -> &'static str {
    match section {
        Section::Abs => "ABS",
        Section::Code => "CODE",
        Section::Data => "DATA",
        Section::Bss => "BSS",
    }
}

fn symbol_flags_name(flags: SymbolFlags) -> &'static str {
    match flags {
        SymbolFlags::Local => "LOCAL",
        SymbolFlags::Export => "EXPORT",
        SymbolFlags::Extern => "EXTERN",
    }
}

fn dump_hex(out: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    if bytes.is_empty() {
        return writeln!(out, "  (empty)");
    }

    for (row_index, row) in bytes.chunks(16).enumerate() {
        write!(out, "  {:06X}: ", row_index * 16)?;

        for byte in row {
            write!(out, "{byte:02X} ")?;
        }
        for _ in row.len()..16 {
            write!(out, "   ")?;
        }

        write!(out, " |")?;
        for byte in row {
            let ch = if (32..127).contains(byte) { *byte as char } else { '.' };
            write!(out, "{ch}")?;
        }
        writeln!(out, "|")?;
    }

    Ok(())
}

/// Prints a full human-readable dump of `image`, read from `path`, to `out`.
pub fn dump(out: &mut impl Write, path: &std::path::Path, image: &ObjectImage) -> io::Result<()> {
    writeln!(out, "=== Object File: {} ===\n", path.display())?;

    writeln!(out, "Header:")?;
    writeln!(out, "  Magic:       EZ8O")?;
    writeln!(out, "  Version:     {}", ez80_object::format::VERSION)?;
    writeln!(out, "  Flags:       0x{:02X}", image.header.flags)?;
    writeln!(out, "  Code size:   {} bytes", image.header.code_size.get())?;
    writeln!(out, "  Data size:   {} bytes", image.header.data_size.get())?;
    writeln!(out, "  BSS size:    {} bytes", image.header.bss_size.get())?;
    writeln!(out, "  Symbols:     {}", image.header.num_symbols.get())?;
    writeln!(out, "  Relocations: {}", image.header.num_relocs.get())?;
    writeln!(out, "  Externals:   {}", image.header.num_externs.get())?;
    writeln!(out, "  String tab:  {} bytes\n", image.header.strtab_size.get())?;

    writeln!(out, "Code Section:")?;
    dump_hex(out, &image.code)?;
    writeln!(out)?;

    writeln!(out, "Data Section:")?;
    dump_hex(out, &image.data)?;
    writeln!(out)?;

    writeln!(out, "BSS Section:")?;
    if image.header.bss_size.get() > 0 {
        writeln!(out, "  {} bytes (uninitialized)", image.header.bss_size.get())?;
    } else {
        writeln!(out, "  (empty)")?;
    }
    writeln!(out)?;

    writeln!(out, "Symbol Table:")?;
    if image.symbols.is_empty() {
        writeln!(out, "  (empty)")?;
    } else {
        writeln!(out, "  {:<6} {:<8} {:<8} {:<6} {}", "Index", "Value", "Section", "Flags", "Name")?;
        writeln!(out, "  {:<6} {:<8} {:<8} {:<6} {}", "-----", "--------", "--------", "------", "----")?;
        for (index, symbol) in image.symbols.iter().enumerate() {
            writeln!(
                out,
                "  {:<6} {:06X}   {:<8} {:<6} {}",
                index,
                symbol.value.get(),
                section_name(symbol.section),
                symbol_flags_name(symbol.flags),
                image.string_at(symbol.name_offset),
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "Relocation Table:")?;
    if image.relocations.is_empty() {
        writeln!(out, "  (empty)")?;
    } else {
        writeln!(out, "  {:<6} {:<8} {:<8} {:<8} {}", "Index", "Offset", "Section", "Type", "Target")?;
        writeln!(out, "  {:<6} {:<8} {:<8} {:<8} {}", "-----", "--------", "--------", "--------", "------")?;
        for (index, reloc) in image.relocations.iter().enumerate() {
            let target = match reloc.target {
                RelocationTarget::External => format!("EXT:{}", reloc.ext_index),
                RelocationTarget::Code => section_name(Section::Code).to_owned(),
                RelocationTarget::Data => section_name(Section::Data).to_owned(),
                RelocationTarget::Bss => section_name(Section::Bss).to_owned(),
            };
            writeln!(
                out,
                "  {:<6} {:06X}   {:<8} {:<8} {target}",
                index,
                reloc.offset.get(),
                section_name(reloc.section),
                "ADDR24",
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "External References:")?;
    if image.externs.is_empty() {
        writeln!(out, "  (empty)")?;
    } else {
        writeln!(out, "  {:<6} {}", "Index", "Name")?;
        writeln!(out, "  {:<6} {}", "-----", "----")?;
        for extern_record in &image.externs {
            writeln!(out, "  {:<6} {}", extern_record.symbol_index.get(), image.string_at(extern_record.name_offset))?;
        }
    }
    writeln!(out)?;

    writeln!(out, "String Table:")?;
    if image.strings.is_empty() {
        writeln!(out, "  (empty)")?;
    } else {
        let mut offset = 0usize;
        while offset < image.strings.len() {
            let end = image.strings[offset..].iter().position(|byte| *byte == 0).map_or(image.strings.len(), |pos| offset + pos);
            let name = String::from_utf8_lossy(&image.strings[offset..end]);
            writeln!(out, "  {offset:06X}: \"{name}\"")?;
            offset = end + 1;
        }
    }
    writeln!(out)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use ez80_object::{
        format::{Header, Section, SymbolFlags, SymbolRecord},
        U24,
    };

    use super::*;

    #[test]
    fn test_dump_empty_object_prints_empty_sections() {
        let image = ObjectImage {
            header: Header {
                flags: 0,
                code_size: U24::new(0),
                data_size: U24::new(0),
                bss_size: U24::new(0),
                num_symbols: U24::new(0),
                num_relocs: U24::new(0),
                num_externs: U24::new(0),
                strtab_size: U24::new(0),
            },
            code: Vec::new(),
            data: Vec::new(),
            symbols: Vec::new(),
            relocations: Vec::new(),
            externs: Vec::new(),
            strings: Vec::new(),
        };

        let mut out = Vec::new();
        dump(&mut out, std::path::Path::new("empty.o"), &image).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Code Section:"));
        assert!(text.contains("(empty)"));
    }

    #[test]
    fn test_dump_prints_symbol_row() {
        let symbol =
            SymbolRecord { name_offset: U24::new(0), section: Section::Code, flags: SymbolFlags::Export, value: U24::new(0x1234) };
        let image = ObjectImage {
            header: Header {
                flags: 0,
                code_size: U24::new(1),
                data_size: U24::new(0),
                bss_size: U24::new(0),
                num_symbols: U24::new(1),
                num_relocs: U24::new(0),
                num_externs: U24::new(0),
                strtab_size: U24::new(5),
            },
            code: vec![0x00],
            data: Vec::new(),
            symbols: vec![symbol],
            relocations: Vec::new(),
            externs: Vec::new(),
            strings: b"main\0".to_vec(),
        };

        let mut out = Vec::new();
        dump(&mut out, std::path::Path::new("t.o"), &image).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("001234"));
        assert!(text.contains("EXPORT"));
        assert!(text.contains("main"));
    }
}
