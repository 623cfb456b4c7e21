//! The on-disk layout of an eZ80 object file: header, symbol/relocation/
//! extern tables, and the string table, each with a bit-exact `Read`/`Write`
//! pair.
//!
//! File layout, in order: [`Header`] (27 bytes), code bytes, data bytes,
//! `num_symbols` [`SymbolRecord`]s (10 bytes each), `num_relocs`
//! [`RelocationRecord`]s (8 bytes each), `num_externs` [`ExternRecord`]s (6
//! bytes each), then the string table.

use std::io;

use bstr::BStr;
use ez80_object_macros::Read as DeriveRead;
use nom::{bytes::complete::tag, number::complete::le_u8, sequence::tuple};

use crate::{combinators::ParseError, Input, Read, Result, Write, U24};

/// `"EZ8O"`, the four magic bytes that open every object file.
pub const MAGIC: [u8; 4] = [0x45, 0x5A, 0x38, 0x4F];

/// The only object file version this crate reads or writes.
pub const VERSION: u8 = 3;

/// The section (or absolute) a symbol or relocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveRead)]
#[repr(u8)]
pub enum Section {
    /// The absolute pseudo-section, used by `EQU`-defined symbols.
    Abs = 0,
    /// The executable code section.
    Code = 1,
    /// The initialized data section.
    Data = 2,
    /// The zero-filled, no-bytes-stored section.
    Bss = 3,
}

impl Write for Section {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        buffer.write_all(&[*self as u8])
    }
}

/// The visibility of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveRead)]
#[repr(u8)]
pub enum SymbolFlags {
    /// Not visible outside the translation unit that defines it.
    Local = 0,
    /// Visible to, and resolvable from, other object files.
    Export = 1,
    /// Defined elsewhere; this translation unit only references it.
    Extern = 2,
}

impl Write for SymbolFlags {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        buffer.write_all(&[*self as u8])
    }
}

/// The kind of a relocation. This format currently defines exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveRead)]
#[repr(u8)]
pub enum RelocationType {
    /// A 24-bit absolute address, patched in place.
    Addr24 = 1,
}

impl Write for RelocationType {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        buffer.write_all(&[*self as u8])
    }
}

/// The destination of a relocation: either an external symbol, or one of the
/// three sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveRead)]
#[repr(u8)]
pub enum RelocationTarget {
    /// The relocation resolves through the external symbol table.
    External = 0,
    /// The relocation resolves to an address in CODE.
    Code = 1,
    /// The relocation resolves to an address in DATA.
    Data = 2,
    /// The relocation resolves to an address in BSS.
    Bss = 3,
}

impl Write for RelocationTarget {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        buffer.write_all(&[*self as u8])
    }
}

/// The 27-byte object file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Reserved for future use; always `0` today.
    pub flags: u8,
    /// Size, in bytes, of the CODE section.
    pub code_size: U24,
    /// Size, in bytes, of the DATA section.
    pub data_size: U24,
    /// Size, in bytes, of the BSS section (no bytes are stored for it).
    pub bss_size: U24,
    /// Number of [`SymbolRecord`]s that follow the code and data bytes.
    pub num_symbols: U24,
    /// Number of [`RelocationRecord`]s.
    pub num_relocs: U24,
    /// Number of [`ExternRecord`]s.
    pub num_externs: U24,
    /// Size, in bytes, of the string table.
    pub strtab_size: U24,
}

/// Size, in bytes, of a serialized [`Header`].
pub const HEADER_SIZE: usize = 27;
/// Size, in bytes, of a serialized [`SymbolRecord`].
pub const SYMBOL_RECORD_SIZE: usize = 10;
/// Size, in bytes, of a serialized [`RelocationRecord`].
pub const RELOCATION_RECORD_SIZE: usize = 8;
/// Size, in bytes, of a serialized [`ExternRecord`].
pub const EXTERN_RECORD_SIZE: usize = 6;

impl Read for Header {
    fn read<'r, E>(input: Input<'r>) -> Result<'r, Self, E>
    where
        E: ParseError<Input<'r>>,
    {
        let (
            input,
            (
                _magic,
                _version,
                flags,
                code_size,
                data_size,
                bss_size,
                num_symbols,
                num_relocs,
                num_externs,
                strtab_size,
            ),
        ) = tuple((
            tag(&MAGIC[..]),
            tag(&[VERSION][..]),
            le_u8,
            U24::read,
            U24::read,
            U24::read,
            U24::read,
            U24::read,
            U24::read,
            U24::read,
        ))(input)?;

        Ok((
            input,
            Self {
                flags,
                code_size,
                data_size,
                bss_size,
                num_symbols,
                num_relocs,
                num_externs,
                strtab_size,
            },
        ))
    }
}

impl Write for Header {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        buffer.write_all(&MAGIC)?;
        buffer.write_all(&[VERSION, self.flags])?;
        self.code_size.write(buffer)?;
        self.data_size.write(buffer)?;
        self.bss_size.write(buffer)?;
        self.num_symbols.write(buffer)?;
        self.num_relocs.write(buffer)?;
        self.num_externs.write(buffer)?;
        self.strtab_size.write(buffer)
    }
}

/// A single entry of the exported symbol table (10 bytes on disk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRecord {
    /// Offset of the symbol's name in the string table.
    pub name_offset: U24,
    /// The section the symbol is defined in.
    pub section: Section,
    /// Always [`SymbolFlags::Export`] on disk: only exported symbols are
    /// serialized.
    pub flags: SymbolFlags,
    /// The symbol's section-relative (pre-link) or absolute (post-link)
    /// value.
    pub value: U24,
}

impl Read for SymbolRecord {
    fn read<'r, E>(input: Input<'r>) -> Result<'r, Self, E>
    where
        E: ParseError<Input<'r>>,
    {
        let (input, (name_offset, section, flags, value, _reserved)) = tuple((
            U24::read,
            Section::read,
            SymbolFlags::read,
            U24::read,
            tag(&[0u8, 0u8][..]),
        ))(input)?;

        Ok((input, Self { name_offset, section, flags, value }))
    }
}

impl Write for SymbolRecord {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        self.name_offset.write(buffer)?;
        self.section.write(buffer)?;
        self.flags.write(buffer)?;
        self.value.write(buffer)?;
        buffer.write_all(&[0, 0])
    }
}

/// A single relocation entry (8 bytes on disk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationRecord {
    /// Offset, within `section`'s byte stream, where the relocation applies.
    pub offset: U24,
    /// The section containing the relocated slot.
    pub section: Section,
    /// The relocation's type; always [`RelocationType::Addr24`] today.
    pub r#type: RelocationType,
    /// What the relocation resolves to.
    pub target: RelocationTarget,
    /// If `target` is [`RelocationTarget::External`], the index into the
    /// extern table; otherwise unused (`0`).
    pub ext_index: u16,
}

impl Read for RelocationRecord {
    fn read<'r, E>(input: Input<'r>) -> Result<'r, Self, E>
    where
        E: ParseError<Input<'r>>,
    {
        let (input, (offset, section, r#type, target, ext_low, ext_high)) =
            tuple((U24::read, Section::read, RelocationType::read, RelocationTarget::read, le_u8, le_u8))(
                input,
            )?;

        Ok((
            input,
            Self { offset, section, r#type, target, ext_index: u16::from(ext_low) | (u16::from(ext_high) << 8) },
        ))
    }
}

impl Write for RelocationRecord {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        self.offset.write(buffer)?;
        self.section.write(buffer)?;
        self.r#type.write(buffer)?;
        self.target.write(buffer)?;
        buffer.write_all(&[(self.ext_index & 0xFF) as u8, (self.ext_index >> 8) as u8])
    }
}

/// A single external reference entry (6 bytes on disk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternRecord {
    /// Offset of the external symbol's name in the string table.
    pub name_offset: U24,
    /// The stable index assigned to this external, referenced by
    /// [`RelocationRecord::ext_index`].
    pub symbol_index: U24,
}

impl Read for ExternRecord {
    fn read<'r, E>(input: Input<'r>) -> Result<'r, Self, E>
    where
        E: ParseError<Input<'r>>,
    {
        let (input, (name_offset, symbol_index)) = tuple((U24::read, U24::read))(input)?;

        Ok((input, Self { name_offset, symbol_index }))
    }
}

impl Write for ExternRecord {
    fn write<B>(&self, buffer: &mut B) -> io::Result<()>
    where
        B: io::Write,
    {
        self.name_offset.write(buffer)?;
        self.symbol_index.write(buffer)
    }
}

/// A view over a serialized string table: a concatenation of
/// null-terminated byte strings, where offset `0` is a valid name.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    bytes: &'a [u8],
}

impl<'a> StringTable<'a> {
    /// Wraps a raw string table slice.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns the null-terminated name starting at `offset`, or `None` if
    /// `offset` is out of bounds.
    pub fn get(&self, offset: U24) -> Option<&'a BStr> {
        let start: usize = offset.into();
        let slice = self.bytes.get(start..)?;
        let end = slice.iter().position(|byte| *byte == 0)?;

        Some(BStr::new(&slice[..end]))
    }
}

/// Accumulates names and returns the offset each was interned at, building a
/// serialized string table incrementally (used by the object writer).
#[derive(Debug, Default)]
pub struct StringTableBuilder {
    bytes: Vec<u8>,
}

impl StringTableBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name`, appending it and its null terminator, and returns the
    /// offset it was written at.
    pub fn intern(&mut self, name: &[u8]) -> U24 {
        let offset = U24::from(self.bytes.len());

        self.bytes.extend_from_slice(name);
        self.bytes.push(0);

        offset
    }

    /// Consumes the builder, returning the serialized string table bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The number of bytes the string table currently occupies.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the string table is currently empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = Header {
            flags: 0,
            code_size: U24::new(12),
            data_size: U24::new(0),
            bss_size: U24::new(4),
            num_symbols: U24::new(1),
            num_relocs: U24::new(1),
            num_externs: U24::new(0),
            strtab_size: U24::new(4),
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &MAGIC);
        assert_eq!(bytes[4], VERSION);

        let (rest, read_back) = Header::read::<nom::error::Error<_>>(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(read_back, header);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, VERSION, 0];
        bytes.extend(std::iter::repeat(0).take(HEADER_SIZE - bytes.len()));

        assert!(Header::read::<nom::error::Error<_>>(&bytes).is_err());
    }

    #[test]
    fn test_symbol_record_round_trip() {
        let symbol =
            SymbolRecord { name_offset: U24::new(0), section: Section::Code, flags: SymbolFlags::Export, value: U24::new(0x001234) };

        let mut bytes = Vec::new();
        symbol.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), SYMBOL_RECORD_SIZE);

        let (rest, read_back) = SymbolRecord::read::<nom::error::Error<_>>(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(read_back, symbol);
    }

    #[test]
    fn test_relocation_record_round_trip() {
        let reloc = RelocationRecord {
            offset: U24::new(1),
            section: Section::Code,
            r#type: RelocationType::Addr24,
            target: RelocationTarget::External,
            ext_index: 0x0102,
        };

        let mut bytes = Vec::new();
        reloc.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), RELOCATION_RECORD_SIZE);
        assert_eq!(bytes[6], 0x02);
        assert_eq!(bytes[7], 0x01);

        let (rest, read_back) = RelocationRecord::read::<nom::error::Error<_>>(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(read_back, reloc);
    }

    #[test]
    fn test_extern_record_round_trip() {
        let extern_record = ExternRecord { name_offset: U24::new(5), symbol_index: U24::new(2) };

        let mut bytes = Vec::new();
        extern_record.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), EXTERN_RECORD_SIZE);

        let (rest, read_back) = ExternRecord::read::<nom::error::Error<_>>(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(read_back, extern_record);
    }

    #[test]
    fn test_string_table() {
        let mut builder = StringTableBuilder::new();
        let foo_offset = builder.intern(b"foo");
        let bar_offset = builder.intern(b"bar");

        let bytes = builder.into_bytes();
        let table = StringTable::new(&bytes);

        assert_eq!(table.get(foo_offset).unwrap(), "foo");
        assert_eq!(table.get(bar_offset).unwrap(), "bar");
        assert!(table.get(U24::new(999)).is_none());
    }
}
