//! Parses a single object file into owned, in-memory buffers ready for
//! printing — the same record tables [`crate::printer`] walks.

use std::path::Path;

use ez80_object::{
    format::{ExternRecord, Header, RelocationRecord, StringTable, SymbolRecord, HEADER_SIZE, VERSION},
    Read as _,
};

use crate::error::Error;

/// One fully-parsed object file.
#[derive(Debug)]
pub struct ObjectImage {
    /// The 27-byte header, kept around for its section sizes.
    pub header: Header,
    /// The CODE section's bytes.
    pub code: Vec<u8>,
    /// The DATA section's bytes.
    pub data: Vec<u8>,
    /// Every symbol table entry, in file order.
    pub symbols: Vec<SymbolRecord>,
    /// Every relocation entry, in file order.
    pub relocations: Vec<RelocationRecord>,
    /// Every extern entry, in file order.
    pub externs: Vec<ExternRecord>,
    /// The raw string table.
    pub strings: Vec<u8>,
}

impl ObjectImage {
    /// Parses a complete object file out of `bytes`.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::BadMagic(format!("{}: file is too short to hold an object header", path.display())));
        }

        let header = match Header::read::<nom::error::Error<&[u8]>>(bytes) {
            Ok((_, header)) if bytes[4] == VERSION => header,
            Ok(_) => {
                return Err(Error::UnsupportedVersion(format!("{}: version {} is not supported", path.display(), bytes[4])))
            }
            Err(_) => return Err(Error::BadMagic(format!("{}: missing the `EZ8O` magic bytes", path.display()))),
        };

        let mut offset = HEADER_SIZE;
        let code = slice(path, bytes, offset, header.code_size.get() as usize)?.to_vec();
        offset += header.code_size.get() as usize;
        let data = slice(path, bytes, offset, header.data_size.get() as usize)?.to_vec();
        offset += header.data_size.get() as usize;

        let symbols: Vec<SymbolRecord> = read_records(path, bytes, &mut offset, header.num_symbols.get() as usize)?;
        let relocations: Vec<RelocationRecord> =
            read_records(path, bytes, &mut offset, header.num_relocs.get() as usize)?;
        let externs: Vec<ExternRecord> = read_records(path, bytes, &mut offset, header.num_externs.get() as usize)?;

        let strings = slice(path, bytes, offset, header.strtab_size.get() as usize)?.to_vec();

        Ok(Self { header, code, data, symbols, relocations, externs, strings })
    }

    /// Looks up a name in this object's string table, falling back to `"???"`
    /// the way the original dump tool does when the offset is out of range.
    pub fn string_at(&self, offset: ez80_object::U24) -> String {
        StringTable::new(&self.strings)
            .get(offset)
            .and_then(|name| name.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| "???".to_owned())
    }
}

fn slice<'a>(path: &Path, bytes: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], Error> {
    bytes.get(offset..offset + len).ok_or_else(|| Error::Truncated(format!("{}: truncated at offset {offset}", path.display())))
}

fn read_records<T: ez80_object::Read>(
    path: &Path,
    bytes: &[u8],
    offset: &mut usize,
    count: usize,
) -> Result<Vec<T>, Error> {
    let mut records = Vec::with_capacity(count);
    let mut cursor = bytes
        .get(*offset..)
        .ok_or_else(|| Error::Truncated(format!("{}: truncated at offset {offset}", path.display())))?;

    for _ in 0..count {
        let (rest, record) = T::read::<nom::error::Error<&[u8]>>(cursor)
            .map_err(|_| Error::Truncated(format!("{}: malformed record table", path.display())))?;
        records.push(record);
        cursor = rest;
    }

    *offset = bytes.len() - cursor.len();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use ez80_object::{
        format::{Section, SymbolFlags},
        Write as _, U24,
    };

    use super::*;

    #[test]
    fn test_parse_reports_symbol_and_string() {
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

        let image = ObjectImage::parse(std::path::Path::new("t.o"), &bytes).unwrap();
        assert_eq!(image.code, vec![0xC9]);
        assert_eq!(image.string_at(image.symbols[0].name_offset), "main");
    }

    #[test]
    fn test_parse_rejects_short_file() {
        assert!(ObjectImage::parse(std::path::Path::new("t.o"), &[0u8; 4]).is_err());
    }
}
