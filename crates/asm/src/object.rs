//! Converts the in-memory state a translation unit assembled to (sections,
//! symbol table, relocations) into the wire format and serializes it.

use std::io;

use ez80_object::format::{
    ExternRecord, Header, RelocationRecord, RelocationTarget, StringTableBuilder, SymbolFlags, SymbolRecord,
    EXTERN_RECORD_SIZE, HEADER_SIZE, RELOCATION_RECORD_SIZE, SYMBOL_RECORD_SIZE,
};
use ez80_object::{Write as _, U24};

use crate::{section::Sections, symtab::SymbolTable};

/// Serializes `symtab`/`sections` into a complete object file image.
pub fn write<B: io::Write>(buffer: &mut B, symtab: &SymbolTable, sections: &Sections) -> io::Result<()> {
    let mut strings = StringTableBuilder::new();

    let exported: Vec<_> = symtab.symbols().filter(|symbol| symbol.flags == SymbolFlags::Export).collect();
    let symbol_records: Vec<SymbolRecord> = exported
        .iter()
        .map(|symbol| SymbolRecord {
            name_offset: strings.intern(symbol.name.as_bytes()),
            section: symbol.section,
            flags: SymbolFlags::Export,
            value: U24::new(symbol.value),
        })
        .collect();

    let extern_names: Vec<&str> = symtab.externs().collect();
    let extern_records: Vec<ExternRecord> = extern_names
        .iter()
        .enumerate()
        .map(|(index, name)| ExternRecord { name_offset: strings.intern(name.as_bytes()), symbol_index: U24::new(index as u32) })
        .collect();

    let reloc_records: Vec<RelocationRecord> = sections
        .relocations()
        .iter()
        .map(|reloc| {
            let ext_index = match (&reloc.target, &reloc.external_name) {
                (RelocationTarget::External, Some(name)) => symtab.extern_index(name).unwrap_or(0),
                _ => 0,
            };
            RelocationRecord {
                offset: U24::new(reloc.offset),
                section: reloc.section,
                r#type: reloc.kind,
                target: reloc.target,
                ext_index,
            }
        })
        .collect();

    let header = Header {
        flags: 0,
        code_size: U24::new(sections.code_size()),
        data_size: U24::new(sections.data_size()),
        bss_size: U24::new(sections.bss_size()),
        num_symbols: U24::new(symbol_records.len() as u32),
        num_relocs: U24::new(reloc_records.len() as u32),
        num_externs: U24::new(extern_records.len() as u32),
        strtab_size: U24::new(strings.len() as u32),
    };

    header.write(buffer)?;
    buffer.write_all(sections.code_bytes())?;
    buffer.write_all(sections.data_bytes())?;
    for record in &symbol_records {
        record.write(buffer)?;
    }
    for record in &reloc_records {
        record.write(buffer)?;
    }
    for record in &extern_records {
        record.write(buffer)?;
    }
    buffer.write_all(&strings.into_bytes())?;

    Ok(())
}

/// Exact size, in bytes, the serialized object file will occupy, without
/// actually building it. Useful for pre-sizing a buffer.
pub fn size(symtab: &SymbolTable, sections: &Sections) -> usize {
    let exported = symtab.symbols().filter(|symbol| symbol.flags == SymbolFlags::Export).count();
    let externs = symtab.externs().count();

    HEADER_SIZE
        + sections.code_bytes().len()
        + sections.data_bytes().len()
        + exported * SYMBOL_RECORD_SIZE
        + sections.relocations().len() * RELOCATION_RECORD_SIZE
        + externs * EXTERN_RECORD_SIZE
}

#[cfg(test)]
mod tests {
    use ez80_object::format::Section;

    use super::*;
    use crate::symtab::Pass;

    #[test]
    fn test_write_round_trips_header_fields() {
        let mut symtab = SymbolTable::new();
        symtab.define("start", 0, Section::Code, Pass::Two).unwrap();
        symtab.set_export("start").unwrap();

        let mut sections = Sections::new();
        sections.emit_byte(Pass::Two, 0xC3);
        sections.emit_long(Pass::Two, 0);

        let mut bytes = Vec::new();
        write(&mut bytes, &symtab, &sections).unwrap();

        assert_eq!(bytes.len(), size(&symtab, &sections));
        assert_eq!(&bytes[0..4], &ez80_object::format::MAGIC);
    }
}
