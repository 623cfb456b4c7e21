use std::fs;

use ez80_object::{
    format::{Header, Section, SymbolFlags, SymbolRecord},
    Write as _, U24,
};

#[test]
fn test_dump_file_prints_symbol_table() {
    let header = Header {
        flags: 0,
        code_size: U24::new(1),
        data_size: U24::new(0),
        bss_size: U24::new(0),
        num_symbols: U24::new(1),
        num_relocs: U24::new(0),
        num_externs: U24::new(0),
        strtab_size: U24::new(5),
    };
    let symbol =
        SymbolRecord { name_offset: U24::new(0), section: Section::Code, flags: SymbolFlags::Export, value: U24::new(0) };

    let mut bytes = Vec::new();
    header.write(&mut bytes).unwrap();
    bytes.push(0xC9);
    symbol.write(&mut bytes).unwrap();
    bytes.extend_from_slice(b"main\0");

    let dir = std::env::temp_dir().join(format!("ez80-dump-test-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("t.o");
    fs::write(&path, bytes).unwrap();

    let mut out = Vec::new();
    ez80_dump::dump_file(&path, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Symbol Table:"));
    assert!(text.contains("main"));
    assert!(text.contains("EXPORT"));
}

#[test]
fn test_dump_file_rejects_bad_magic() {
    let dir = std::env::temp_dir().join(format!("ez80-dump-test-bad-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.o");
    fs::write(&path, [0u8; 27]).unwrap();

    let mut out = Vec::new();
    assert!(ez80_dump::dump_file(&path, &mut out).is_err());
}
