use std::{fs, path::PathBuf};

use ez80_object::{
    format::{
        ExternRecord, Header, RelocationRecord, RelocationTarget, RelocationType, Section, SymbolFlags, SymbolRecord,
    },
    Write as _, U24,
};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ez80-linker-test-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_object(
    path: &std::path::Path,
    code: &[u8],
    data: &[u8],
    bss_size: u32,
    symbols: &[(&str, Section, u32)],
    externs: &[&str],
    relocations: &[(u32, Section, RelocationTarget, u16)],
) {
    let mut strings = ez80_object::format::StringTableBuilder::new();
    let symbol_records: Vec<SymbolRecord> = symbols
        .iter()
        .map(|(name, section, value)| SymbolRecord {
            name_offset: strings.intern(name.as_bytes()),
            section: *section,
            flags: SymbolFlags::Export,
            value: U24::new(*value),
        })
        .collect();
    let extern_records: Vec<ExternRecord> = externs
        .iter()
        .enumerate()
        .map(|(index, name)| ExternRecord { name_offset: strings.intern(name.as_bytes()), symbol_index: U24::new(index as u32) })
        .collect();
    let relocation_records: Vec<RelocationRecord> = relocations
        .iter()
        .map(|(offset, section, target, ext_index)| RelocationRecord {
            offset: U24::new(*offset),
            section: *section,
            r#type: RelocationType::Addr24,
            target: *target,
            ext_index: *ext_index,
        })
        .collect();

    let strtab = strings.into_bytes();
    let header = Header {
        flags: 0,
        code_size: U24::new(code.len() as u32),
        data_size: U24::new(data.len() as u32),
        bss_size: U24::new(bss_size),
        num_symbols: U24::new(symbol_records.len() as u32),
        num_relocs: U24::new(relocation_records.len() as u32),
        num_externs: U24::new(extern_records.len() as u32),
        strtab_size: U24::new(strtab.len() as u32),
    };

    let mut bytes = Vec::new();
    header.write(&mut bytes).unwrap();
    bytes.extend_from_slice(code);
    bytes.extend_from_slice(data);
    for symbol in &symbol_records {
        symbol.write(&mut bytes).unwrap();
    }
    for reloc in &relocation_records {
        reloc.write(&mut bytes).unwrap();
    }
    for extern_record in &extern_records {
        extern_record.write(&mut bytes).unwrap();
    }
    bytes.extend_from_slice(&strtab);

    fs::write(path, bytes).unwrap();
}

#[test]
fn test_link_patches_an_external_call_across_two_objects() {
    let dir = scratch_dir("call");

    // Object 1: exports `main` at CODE offset 0, 12 bytes of code.
    let object1 = dir.join("main.o");
    write_object(&object1, &[0u8; 12], &[], 0, &[("main", Section::Code, 0)], &[], &[]);

    // Object 2: `call main` at CODE offset 0 (opcode 0xCD followed by a
    // 24-bit placeholder address), referencing `main` as an external.
    let object2 = dir.join("caller.o");
    write_object(
        &object2,
        &[0xCD, 0x00, 0x00, 0x00],
        &[],
        0,
        &[],
        &["main"],
        &[(1, Section::Code, RelocationTarget::External, 0)],
    );

    let output = dir.join("a.out");
    ez80_linker::Configuration::new(vec![object1, object2])
        .with_base_address(0x04_0000)
        .with_output_file(output.clone())
        .linker()
        .link()
        .unwrap();

    let bytes = fs::read(&output).unwrap();
    // object1 occupies [0..12), object2's CODE starts at offset 12.
    assert_eq!(&bytes[12..16], &[0xCD, 0x00, 0x00, 0x04]);
}

#[test]
fn test_link_fails_on_undefined_symbol() {
    let dir = scratch_dir("undefined");

    let object = dir.join("caller.o");
    write_object(
        &object,
        &[0xCD, 0x00, 0x00, 0x00],
        &[],
        0,
        &[],
        &["missing"],
        &[(1, Section::Code, RelocationTarget::External, 0)],
    );

    let output = dir.join("a.out");
    let result = ez80_linker::Configuration::new(vec![object]).with_output_file(output).linker().link();

    assert!(result.is_err());
}

#[test]
fn test_link_synthesizes_section_symbols() {
    let dir = scratch_dir("synth");

    let object = dir.join("one.o");
    write_object(&object, &[0x00; 4], &[0xFF; 2], 3, &[], &[], &[]);

    let output = dir.join("a.out");
    let map = dir.join("a.map");
    ez80_linker::Configuration::new(vec![object])
        .with_base_address(0x10_0000)
        .with_output_file(output)
        .with_map_file(Some(map.clone()))
        .linker()
        .link()
        .unwrap();

    let map_text = fs::read_to_string(&map).unwrap();
    assert!(map_text.contains("__low_code"));
    assert!(map_text.contains("__len_bss"));
    assert!(map_text.contains("100000"));
}

#[test]
fn test_link_rejects_duplicate_export() {
    let dir = scratch_dir("dup");

    let object1 = dir.join("a.o");
    write_object(&object1, &[0x00; 2], &[], 0, &[("shared", Section::Code, 0)], &[], &[]);
    let object2 = dir.join("b.o");
    write_object(&object2, &[0x00; 2], &[], 0, &[("shared", Section::Code, 0)], &[], &[]);

    let output = dir.join("a.out");
    let result = ez80_linker::Configuration::new(vec![object1, object2]).with_output_file(output).linker().link();

    assert!(result.is_err());
}
