//! A two-pass eZ80 ADL-mode assembler: pass 1 sizes and defines symbols
//! without emitting anything, pass 2 re-executes identically and emits bytes
//! and relocations. The two passes must walk an identical control-flow path
//! (same lines, in the same order, through the same `INCLUDE`s) or the sizes
//! pass 1 computed won't match what pass 2 actually emits.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod directive;
pub mod error;
mod expr;
mod instr;
mod lexer;
mod object;
mod operand;
mod section;
mod symtab;

use std::{fs, path::{Path, PathBuf}};

use error::{at, Error};
use expr::{mangle_local, ExprContext};
use lexer::{tokenize, Cursor, TokenKind};
use section::Sections;
use symtab::{Pass, SymbolTable};

/// The longest string or character literal this assembler accepts, matching
/// the original tool's fixed-size line buffer.
pub(crate) const MAX_STRING_LEN: usize = 256;

/// How deeply `INCLUDE` may nest before this is almost certainly a cycle.
const MAX_INCLUDE_DEPTH: usize = 64;

enum Flow {
    Continue,
    End,
}

/// Drives both passes over `path` and returns the finished symbol table and
/// section contents, ready to be handed to [`object::write`].
pub struct Assembler {
    symtab: SymbolTable,
}

impl Assembler {
    /// Creates a fresh assembler with an empty symbol table.
    pub fn new() -> Self {
        Self { symtab: SymbolTable::new() }
    }

    /// Assembles `path`, running pass 1 then pass 2, and returns the
    /// resulting symbol table and section contents.
    pub fn assemble(mut self, path: &Path) -> Result<(SymbolTable, Sections), Error> {
        log::debug!("pass 1: {}", path.display());
        let mut local_scope = 0u32;
        let mut sections = Sections::new();
        run_pass(path, Pass::One, &mut self.symtab, &mut sections, &mut local_scope, 0)?;

        log::debug!("pass 2: {}", path.display());
        let mut local_scope = 0u32;
        let mut sections = Sections::new();
        run_pass(path, Pass::Two, &mut self.symtab, &mut sections, &mut local_scope, 0)?;

        Ok((self.symtab, sections))
    }

    /// Assembles `path` and serializes the result as an object file, written
    /// to `output`.
    pub fn assemble_to(self, path: &Path, output: &Path) -> Result<(), Error> {
        let (symtab, sections) = self.assemble(path)?;
        let mut buffer = Vec::with_capacity(object::size(&symtab, &sections));
        object::write(&mut buffer, &symtab, &sections).map_err(Error::Io)?;
        fs::write(output, buffer).map_err(|source| Error::CannotWriteOutput(at(output, 0, source)))?;
        Ok(())
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_pass(
    path: &Path,
    pass: Pass,
    symtab: &mut SymbolTable,
    sections: &mut Sections,
    local_scope: &mut u32,
    depth: usize,
) -> Result<Flow, Error> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(Error::CannotOpenFile(at(path, 0, "INCLUDE nests too deeply; likely a cycle")));
    }

    let text = fs::read_to_string(path)
        .map_err(|source| Error::CannotOpenFile(at(path, 0, format!("{}: {source}", path.display()))))?;

    for (index, line) in text.lines().enumerate() {
        let line_number = (index + 1) as u32;
        let tokens = tokenize(path, line_number, line)?;

        match process_line(path, pass, symtab, sections, local_scope, depth, &tokens)? {
            Flow::Continue => {}
            Flow::End => return Ok(Flow::End),
        }
    }

    Ok(Flow::Continue)
}

fn process_line(
    file: &Path,
    pass: Pass,
    symtab: &mut SymbolTable,
    sections: &mut Sections,
    local_scope: &mut u32,
    depth: usize,
    tokens: &[lexer::Token],
) -> Result<Flow, Error> {
    let mut cursor = Cursor::new(tokens);

    let label = read_label(&mut cursor, *local_scope);

    if cursor.at_eol() {
        bind_label(symtab, sections, pass, label.as_ref(), local_scope)?;
        return Ok(Flow::Continue);
    }

    let (name, consumed_equals) = match cursor.peek().clone() {
        TokenKind::Equals => {
            cursor.advance();
            ("EQU".to_owned(), true)
        }
        TokenKind::Ident(name) => {
            cursor.advance();
            (name, false)
        }
        _ => {
            return Err(Error::InvalidOperands(at(
                file,
                cursor.line(),
                "expected a mnemonic, directive, or `=`",
            )))
        }
    };
    let _ = consumed_equals;

    let upper = name.to_ascii_uppercase();

    if directive::is_known(&upper) {
        if upper != "EQU" {
            bind_label(symtab, sections, pass, label.as_ref(), local_scope)?;
        }

        let label_name = label.as_ref().map(|l| l.name.as_str());
        match directive::execute(file, pass, symtab, sections, label_name, *local_scope, &upper, &mut cursor)? {
            directive::Outcome::Handled => {}
            directive::Outcome::End => return Ok(Flow::End),
            directive::Outcome::Include(relative) => {
                let included = resolve_relative(file, &relative);
                match run_pass(&included, pass, symtab, sections, local_scope, depth + 1)? {
                    Flow::Continue => {}
                    Flow::End => return Ok(Flow::End),
                }
            }
            directive::Outcome::Incbin(relative) => {
                let included = resolve_relative(file, &relative);
                let bytes = fs::read(&included)
                    .map_err(|source| Error::CannotOpenFile(at(&included, 0, format!("{}: {source}", included.display()))))?;
                for byte in bytes {
                    sections.emit_byte(pass, byte);
                }
            }
        }

        return Ok(Flow::Continue);
    }

    bind_label(symtab, sections, pass, label.as_ref(), local_scope)?;

    let ctx = ExprContext::new(file, symtab, pass, sections.pc(), *local_scope);
    let mut ictx = instr::InstrContext { ctx: &ctx, sections };
    if !instr::execute(&mut ictx, &upper, &mut cursor)? {
        return Err(Error::UnknownMnemonic(at(file, cursor.line(), format!("`{name}`"))));
    }

    Ok(Flow::Continue)
}

/// A label read off the start of a line: its (possibly scope-mangled) name,
/// and whether it was a global label, i.e. one that starts a new local-label
/// scope.
struct LabelInfo {
    name: String,
    is_global: bool,
}

/// Reads an optional leading label off the cursor: either `name:` (the
/// lexer's dedicated [`TokenKind::Label`]), or a bare `name` immediately
/// followed by `EQU`/`=` (the conventional assignment-without-colon form).
/// Mangles local labels (`@loop`) against the current scope.
fn read_label(cursor: &mut Cursor, local_scope: u32) -> Option<LabelInfo> {
    let raw = match cursor.peek().clone() {
        TokenKind::Label(name) => {
            cursor.advance();
            Some(name)
        }
        TokenKind::Ident(name) => {
            let mut lookahead = cursor.clone();
            lookahead.advance();
            let is_assignment = matches!(lookahead.peek(), TokenKind::Equals)
                || matches!(lookahead.peek(), TokenKind::Ident(next) if next.eq_ignore_ascii_case("EQU"));

            if is_assignment {
                cursor.advance();
                Some(name)
            } else {
                None
            }
        }
        _ => None,
    }?;

    let is_global = !raw.starts_with('@');
    Some(LabelInfo { name: mangle_local(&raw, local_scope), is_global })
}

/// Binds an address-position label to the current PC. Starting a new global
/// label also advances the local-label scope counter, so local labels
/// (`@loop`) defined after it don't collide with same-named ones before it.
fn bind_label(
    symtab: &mut SymbolTable,
    sections: &Sections,
    pass: Pass,
    label: Option<&LabelInfo>,
    local_scope: &mut u32,
) -> Result<(), Error> {
    let Some(label) = label else { return Ok(()) };

    symtab.define(&label.name, sections.pc(), sections.current(), pass)?;

    if label.is_global {
        *local_scope += 1;
    }

    Ok(())
}

fn resolve_relative(current_file: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }

    current_file.parent().map_or_else(|| target.to_path_buf(), |parent| parent.join(target))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use ez80_object::format::Section;

    use super::*;

    fn write_temp(contents: &str) -> (tempfile_dir::TempDir, PathBuf) {
        let dir = tempfile_dir::TempDir::new();
        let path = dir.path().join("t.asm");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    mod tempfile_dir {
        use std::path::PathBuf;

        /// A minimal throwaway directory, removed when dropped. Standing in
        /// for the `tempfile` crate so these tests have no extra dev
        /// dependency beyond what the rest of the workspace already needs.
        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new() -> Self {
                let path = std::env::temp_dir().join(format!("ez80asm-test-{}", std::process::id()));
                let _ = std::fs::remove_dir_all(&path);
                std::fs::create_dir_all(&path).unwrap();
                Self(path)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn test_assembles_a_simple_forward_jump() {
        let (_dir, path) = write_temp("start:\n  JP start\n");
        let (symtab, sections) = Assembler::new().assemble(&path).unwrap();

        assert_eq!(sections.code_bytes(), &[0xC3, 0x00, 0x00, 0x00]);
        assert_eq!(symtab.find("start").unwrap().value, 0);
    }

    #[test]
    fn test_forward_reference_resolves_in_pass_two() {
        let (_dir, path) = write_temp("  JP later\nlater:\n  NOP\n");
        let (_symtab, sections) = Assembler::new().assemble(&path).unwrap();

        assert_eq!(&sections.code_bytes()[0..4], &[0xC3, 0x04, 0x00, 0x00]);
        assert_eq!(sections.code_bytes()[4], 0x00);
    }

    #[test]
    fn test_equ_without_colon_defines_a_constant() {
        let (_dir, path) = write_temp("WIDTH EQU 80\n  LD A,WIDTH\n");
        let (symtab, _sections) = Assembler::new().assemble(&path).unwrap();

        assert_eq!(symtab.find("WIDTH").unwrap().value, 80);
    }

    #[test]
    fn test_local_labels_are_scoped_to_the_nearest_global_label() {
        let (_dir, path) = write_temp("first:\n@loop:\n  DJNZ @loop\nsecond:\n@loop:\n  NOP\n");
        let result = Assembler::new().assemble(&path);
        assert!(result.is_ok());
    }

    #[test]
    fn test_section_switch_is_honored() {
        let (_dir, path) = write_temp("  SECTION DATA\nvalue:\n  DB 42\n");
        let (symtab, sections) = Assembler::new().assemble(&path).unwrap();

        assert_eq!(sections.data_bytes(), &[42]);
        assert_eq!(symtab.find("value").unwrap().section, Section::Data);
    }

    #[test]
    fn test_unknown_mnemonic_is_reported() {
        let (_dir, path) = write_temp("  FROBNICATE\n");
        assert!(Assembler::new().assemble(&path).is_err());
    }
}
