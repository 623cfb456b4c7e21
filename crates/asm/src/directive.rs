//! Directive dispatch: assignment, data emission, section control, symbol
//! linkage, and file inclusion.

use std::path::{Path, PathBuf};

use ez80_object::format::Section;

use crate::{
    error::{at, Error},
    expr::{ExprContext, SymbolicTerm, Value},
    lexer::{Cursor, TokenKind},
    section::Sections,
    symtab::{Pass, SymbolTable},
};

/// What happened after dispatching one directive. Most directives are fully
/// handled in place; the three that need the line-reading driver's help
/// report back through this instead.
pub enum Outcome {
    /// The directive was fully handled.
    Handled,
    /// `INCLUDE "path"`: the driver should assemble `path` in place, then
    /// resume this file.
    Include(PathBuf),
    /// `INCBIN "path"`: the driver should read `path` and append its raw
    /// bytes to the current section.
    Incbin(PathBuf),
    /// `END`: stop assembling, as if the source ended here.
    End,
}

/// Whether `name` (already uppercased, any leading `.` stripped by the
/// caller) names a known directive.
pub fn is_known(name: &str) -> bool {
    matches!(
        name,
        "ORG"
            | "EQU"
            | "DB" | "DEFB" | "BYTE"
            | "DW" | "DEFW" | "WORD"
            | "DL" | "DEFL" | "LONG" | "DD"
            | "DS" | "DEFS" | "RMB" | "BLKB"
            | "SECTION"
            | "XDEF" | "PUBLIC" | "GLOBAL"
            | "XREF" | "EXTERN" | "EXTERNAL"
            | "ALIGN"
            | "ASCII"
            | "ASCIZ" | "ASCIIZ"
            | "ASSUME"
            | "INCLUDE"
            | "INCBIN"
            | "END"
    )
}

fn eval(file: &Path, symtab: &SymbolTable, pass: Pass, pc: u32, local_scope: u32, cursor: &mut Cursor) -> Result<Value, Error> {
    ExprContext::new(file, symtab, pass, pc, local_scope).eval(cursor)
}

fn expect_comma(file: &Path, cursor: &mut Cursor) -> Result<(), Error> {
    if !matches!(cursor.peek(), TokenKind::Comma) {
        return Err(Error::ExpectedComma(at(file, cursor.line(), "expected `,` here")));
    }
    cursor.advance();
    Ok(())
}

fn expect_eol(file: &Path, cursor: &mut Cursor) -> Result<(), Error> {
    if !cursor.at_eol() {
        return Err(Error::TrailingContent(at(file, cursor.line(), "unexpected content after this directive")));
    }
    Ok(())
}

fn expect_string(file: &Path, cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
    match cursor.peek().clone() {
        TokenKind::Str(bytes) => {
            cursor.advance();
            Ok(bytes)
        }
        _ => Err(Error::BadLiteral(at(file, cursor.line(), "expected a string literal"))),
    }
}

fn expect_ident(file: &Path, cursor: &mut Cursor) -> Result<String, Error> {
    match cursor.peek().clone() {
        TokenKind::Ident(name) => {
            cursor.advance();
            Ok(name)
        }
        _ => Err(Error::InvalidOperands(at(file, cursor.line(), "expected a name"))),
    }
}

fn section_from_term(term: SymbolicTerm) -> Section {
    match term {
        SymbolicTerm::Local(section) => section,
        SymbolicTerm::External => Section::Abs,
    }
}

/// Dispatches one directive. `label`, if present, is the label (if any) that
/// preceded the directive on this line; only `EQU`/`=` consult it directly,
/// since every other directive's label was already bound to the current PC
/// by the driver before calling this.
pub fn execute(
    file: &Path,
    pass: Pass,
    symtab: &mut SymbolTable,
    sections: &mut Sections,
    label: Option<&str>,
    local_scope: u32,
    name: &str,
    cursor: &mut Cursor,
) -> Result<Outcome, Error> {
    log::trace!("{}:{}: dispatching directive {name}", file.display(), cursor.line());

    match name {
        "ORG" => {
            let value = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
            if value.symbol.is_some() {
                return Err(Error::InvalidOperands(at(file, cursor.line(), "ORG requires a constant address")));
            }
            sections.set_pc(value.value);
        }

        "EQU" => {
            let label = label.ok_or_else(|| {
                Error::EquWithoutLabel(at(file, cursor.line(), "EQU must be preceded by a label"))
            })?;
            let value = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
            let section = value.symbol.as_ref().map_or(Section::Abs, |(_, term)| section_from_term(*term));
            symtab.define(label, value.value, section, pass)?;
        }

        "DB" | "DEFB" | "BYTE" => loop {
            if matches!(cursor.peek(), TokenKind::Str(_)) {
                let bytes = expect_string(file, cursor)?;
                for byte in bytes {
                    sections.emit_byte(pass, byte);
                }
            } else {
                let value = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
                if value.symbol.is_some() {
                    return Err(Error::InvalidOperands(at(file, cursor.line(), "a byte cannot hold a relocatable address")));
                }
                sections.emit_byte(pass, (value.value & 0xFF) as u8);
            }
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.advance();
            } else {
                break;
            }
        },

        "DW" | "DEFW" | "WORD" => loop {
            let value = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
            if value.symbol.is_some() {
                return Err(Error::InvalidOperands(at(file, cursor.line(), "a word cannot hold a relocatable address")));
            }
            sections.emit_word(pass, value.value);
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.advance();
            } else {
                break;
            }
        },

        "DL" | "DEFL" | "LONG" | "DD" => loop {
            let value = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
            sections.emit_addr24(file, cursor.line(), pass, &value)?;
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.advance();
            } else {
                break;
            }
        },

        "DS" | "DEFS" | "RMB" | "BLKB" => {
            let count = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
            let fill = if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.advance();
                eval(file, symtab, pass, sections.pc(), local_scope, cursor)?.value
            } else {
                0
            };
            sections.reserve(pass, count.value, (fill & 0xFF) as u8);
        }

        "SECTION" => {
            let ident = expect_ident(file, cursor)?;
            let section = match ident.to_ascii_uppercase().as_str() {
                "CODE" | "TEXT" => Section::Code,
                "DATA" => Section::Data,
                "BSS" => Section::Bss,
                _ => {
                    return Err(Error::InvalidOperands(at(
                        file,
                        cursor.line(),
                        format!("`{ident}` is not CODE, DATA, or BSS"),
                    )))
                }
            };
            sections.switch_to(section);
        }

        "XDEF" | "PUBLIC" | "GLOBAL" => loop {
            let ident = expect_ident(file, cursor)?;
            if ident.starts_with('@') {
                return Err(Error::InvalidOperands(at(file, cursor.line(), "local labels cannot be exported")));
            }
            symtab.set_export(&ident)?;
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.advance();
            } else {
                break;
            }
        },

        "XREF" | "EXTERN" | "EXTERNAL" => loop {
            let ident = expect_ident(file, cursor)?;
            if ident.starts_with('@') {
                return Err(Error::InvalidOperands(at(
                    file,
                    cursor.line(),
                    "local labels cannot be external references",
                )));
            }
            symtab.set_extern(&ident)?;
            if matches!(cursor.peek(), TokenKind::Comma) {
                cursor.advance();
            } else {
                break;
            }
        },

        "ALIGN" => {
            let boundary = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?.value;
            if boundary == 0 || (boundary & (boundary - 1)) != 0 {
                return Err(Error::AlignNotPowerOfTwo(at(
                    file,
                    cursor.line(),
                    format!("{boundary} is not a power of two"),
                )));
            }
            let mask = boundary - 1;
            let padding = (boundary - (sections.pc() & mask)) & mask;
            sections.reserve(pass, padding, 0);
        }

        "ASCII" => {
            let bytes = expect_string(file, cursor)?;
            for byte in bytes {
                sections.emit_byte(pass, byte);
            }
        }

        "ASCIZ" | "ASCIIZ" => {
            let bytes = expect_string(file, cursor)?;
            for byte in bytes {
                sections.emit_byte(pass, byte);
            }
            sections.emit_byte(pass, 0);
        }

        "ASSUME" => {
            let ident = expect_ident(file, cursor)?;
            if ident.to_ascii_uppercase() != "ADL" {
                return Err(Error::InvalidOperands(at(
                    file,
                    cursor.line(),
                    format!("`ASSUME {ident}` is not supported; only `ASSUME ADL=n` is"),
                )));
            }
            if !matches!(cursor.peek(), TokenKind::Equals) {
                return Err(Error::ExpectedComma(at(file, cursor.line(), "expected `=` after `ADL`")));
            }
            cursor.advance();

            let value = eval(file, symtab, pass, sections.pc(), local_scope, cursor)?;
            if value.value != 1 {
                return Err(Error::InvalidOperands(at(
                    file,
                    cursor.line(),
                    "this assembler only emits ADL-mode code; `ASSUME ADL=0` is rejected",
                )));
            }

            expect_eol(file, cursor)?;
        }

        "INCLUDE" => {
            let bytes = expect_string(file, cursor)?;
            let path = PathBuf::from(String::from_utf8_lossy(&bytes).into_owned());
            expect_eol(file, cursor)?;
            return Ok(Outcome::Include(path));
        }

        "INCBIN" => {
            let bytes = expect_string(file, cursor)?;
            let path = PathBuf::from(String::from_utf8_lossy(&bytes).into_owned());
            expect_eol(file, cursor)?;
            return Ok(Outcome::Incbin(path));
        }

        "END" => {
            return Ok(Outcome::End);
        }

        _ => {
            return Err(Error::UnknownDirective(at(file, cursor.line(), format!("`{name}`"))));
        }
    }

    expect_eol(file, cursor)?;
    Ok(Outcome::Handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn run(symtab: &mut SymbolTable, sections: &mut Sections, pass: Pass, label: Option<&str>, text: &str) -> Outcome {
        let file = Path::new("t.asm");
        let tokens = tokenize(file, 1, text).unwrap();
        let mut cursor = Cursor::new(&tokens);
        let name_token = cursor.advance().clone();
        let name = match name_token {
            TokenKind::Ident(name) => name.to_ascii_uppercase(),
            _ => panic!("expected a directive name"),
        };
        execute(file, pass, symtab, sections, label, 0, &name, &mut cursor).unwrap()
    }

    #[test]
    fn test_equ_defines_a_constant() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        run(&mut symtab, &mut sections, Pass::One, Some("WIDTH"), "EQU 80");
        assert_eq!(symtab.find("WIDTH").unwrap().value, 80);
    }

    #[test]
    fn test_db_emits_bytes_and_strings() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        run(&mut symtab, &mut sections, Pass::Two, None, "DB 1, 2, \"AB\"");
        assert_eq!(sections.code_bytes(), &[1, 2, b'A', b'B']);
    }

    #[test]
    fn test_ds_reserves_without_emitting_in_bss() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        sections.switch_to(Section::Bss);
        run(&mut symtab, &mut sections, Pass::Two, None, "DS 16");
        assert_eq!(sections.bss_size(), 16);
    }

    #[test]
    fn test_align_pads_to_boundary() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        sections.emit_byte(Pass::Two, 0); // pc = 1
        run(&mut symtab, &mut sections, Pass::Two, None, "ALIGN 4");
        assert_eq!(sections.pc(), 4);
    }

    #[test]
    fn test_align_rejects_non_power_of_two() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        let file = Path::new("t.asm");
        let tokens = tokenize(file, 1, "ALIGN 3").unwrap();
        let mut cursor = Cursor::new(&tokens);
        cursor.advance();
        assert!(execute(file, Pass::Two, &mut symtab, &mut sections, None, 0, "ALIGN", &mut cursor).is_err());
    }

    #[test]
    fn test_xdef_and_xref_set_linkage() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        run(&mut symtab, &mut sections, Pass::One, None, "XREF foo");
        assert!(symtab.is_extern("foo"));
    }

    #[test]
    fn test_include_reports_outcome() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        match run(&mut symtab, &mut sections, Pass::One, None, "INCLUDE \"other.asm\"") {
            Outcome::Include(path) => assert_eq!(path, PathBuf::from("other.asm")),
            _ => panic!("expected Outcome::Include"),
        }
    }

    #[test]
    fn test_assume_adl_1_is_accepted() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        run(&mut symtab, &mut sections, Pass::Two, None, "ASSUME ADL=1");
    }

    #[test]
    fn test_assume_adl_0_is_rejected() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        let file = Path::new("t.asm");
        let tokens = tokenize(file, 1, "ASSUME ADL=0").unwrap();
        let mut cursor = Cursor::new(&tokens);
        cursor.advance();
        assert!(execute(file, Pass::Two, &mut symtab, &mut sections, None, 0, "ASSUME", &mut cursor).is_err());
    }

    #[test]
    fn test_xdef_rejects_local_names() {
        let mut symtab = SymbolTable::new();
        let mut sections = Sections::new();
        let file = Path::new("t.asm");
        let tokens = tokenize(file, 1, "XDEF @loop").unwrap();
        let mut cursor = Cursor::new(&tokens);
        cursor.advance();
        assert!(execute(file, Pass::One, &mut symtab, &mut sections, None, 0, "XDEF", &mut cursor).is_err());
    }
}
