//! The expression evaluator: `expr = term (('+'|'-') term)*`, `term = factor
//! (('*'|'/') factor)*`, `factor = number | char | '$' | identifier | '('
//! expr ')' | ('+'|'-') factor`.
//!
//! A value carries a 24-bit integer plus at most one symbolic term, so the
//! encoder can tell a pure constant from `symbol + n` and emit (or not
//! emit) a relocation accordingly.

use ez80_object::format::Section;

use crate::{
    error::{at, Error},
    lexer::{Cursor, TokenKind},
    symtab::{Pass, SymbolTable},
};

/// What a carried symbol resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicTerm {
    /// A symbol defined in this translation unit, in a concrete section.
    Local(Section),
    /// A symbol declared `EXTERN`, resolved by the linker.
    External,
}

/// The result of evaluating an expression: a 24-bit integer, and at most
/// one symbolic term it is relative to.
#[derive(Debug, Clone)]
pub struct Value {
    /// The constant part of the expression.
    pub value: u32,
    /// The symbol this value is relative to, if any, and how it combines.
    pub symbol: Option<(String, SymbolicTerm)>,
    /// Whether the symbolic term entered through subtraction on the right
    /// (`5 - symbol`). Such a term cannot be represented by this object
    /// format's purely-additive `ADDR24` relocation and is rejected if it
    /// ever reaches a relocatable operand.
    pub negated: bool,
}

impl Value {
    fn constant(value: u32) -> Self {
        Self { value, symbol: None, negated: false }
    }
}

/// Mangles a local label (one starting with `@`) against the scope counter
/// active when it was referenced or defined, so `@loop` after one global
/// label doesn't collide with `@loop` after another.
pub fn mangle_local(name: &str, local_scope: u32) -> String {
    if name.starts_with('@') {
        format!("{name}:{local_scope}")
    } else {
        name.to_owned()
    }
}

/// Evaluates expressions against a fixed symbol table, pass, and program
/// counter.
pub struct ExprContext<'a> {
    file: &'a std::path::Path,
    symtab: &'a SymbolTable,
    pass: Pass,
    pc: u32,
    local_scope: u32,
}

impl<'a> ExprContext<'a> {
    /// Builds an evaluation context for the current line.
    pub fn new(file: &'a std::path::Path, symtab: &'a SymbolTable, pass: Pass, pc: u32, local_scope: u32) -> Self {
        Self { file, symtab, pass, pc, local_scope }
    }

    /// The file this context is evaluating expressions for, used to prefix
    /// diagnostics.
    pub fn file(&self) -> &std::path::Path {
        self.file
    }

    /// The program counter `$` resolves to.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// The pass currently executing.
    pub fn pass(&self) -> Pass {
        self.pass
    }

    /// The symbol table this context resolves identifiers against.
    pub fn symtab(&self) -> &SymbolTable {
        self.symtab
    }

    /// Parses and evaluates a full expression starting at the cursor.
    pub fn eval(&self, cursor: &mut Cursor) -> Result<Value, Error> {
        let mut value = self.eval_term(cursor)?;

        loop {
            match cursor.peek() {
                TokenKind::Plus => {
                    cursor.advance();
                    let rhs = self.eval_term(cursor)?;
                    value = add(value, rhs);
                }
                TokenKind::Minus => {
                    cursor.advance();
                    let rhs = self.eval_term(cursor)?;
                    value = sub(self.file, cursor.line(), value, rhs)?;
                }
                _ => break,
            }
        }

        Ok(value)
    }

    fn eval_term(&self, cursor: &mut Cursor) -> Result<Value, Error> {
        let mut value = self.eval_factor(cursor)?;

        loop {
            match cursor.peek() {
                TokenKind::Star => {
                    cursor.advance();
                    let rhs = self.eval_factor(cursor)?;
                    value = Value::constant(value.value.wrapping_mul(rhs.value) & 0x00FF_FFFF);
                }
                TokenKind::Slash => {
                    cursor.advance();
                    let rhs = self.eval_factor(cursor)?;
                    if rhs.value == 0 {
                        return Err(Error::DivisionByZero(at(self.file, cursor.line(), "division by zero")));
                    }
                    value = Value::constant((value.value / rhs.value) & 0x00FF_FFFF);
                }
                _ => break,
            }
        }

        Ok(value)
    }

    fn eval_factor(&self, cursor: &mut Cursor) -> Result<Value, Error> {
        match cursor.peek().clone() {
            TokenKind::Number(n) => {
                cursor.advance();
                Ok(Value::constant(n & 0x00FF_FFFF))
            }
            TokenKind::Char(c) => {
                cursor.advance();
                Ok(Value::constant(c & 0x00FF_FFFF))
            }
            TokenKind::Dollar => {
                cursor.advance();
                Ok(Value::constant(self.pc & 0x00FF_FFFF))
            }
            TokenKind::LParen => {
                cursor.advance();
                let value = self.eval(cursor)?;
                if !matches!(cursor.peek(), TokenKind::RParen) {
                    return Err(Error::ExpectedCloseParen(at(
                        self.file,
                        cursor.line(),
                        "expected `)` to close this sub-expression",
                    )));
                }
                cursor.advance();
                Ok(value)
            }
            TokenKind::Plus => {
                cursor.advance();
                self.eval_factor(cursor)
            }
            TokenKind::Minus => {
                cursor.advance();
                let value = self.eval_factor(cursor)?;
                Ok(Value {
                    value: value.value.wrapping_neg() & 0x00FF_FFFF,
                    symbol: value.symbol,
                    negated: !value.negated,
                })
            }
            TokenKind::Ident(name) => {
                cursor.advance();
                self.eval_identifier(cursor, &name)
            }
            _ => Err(Error::InvalidOperands(at(self.file, cursor.line(), "expected a number, `$`, or a name"))),
        }
    }

    fn eval_identifier(&self, cursor: &Cursor, raw_name: &str) -> Result<Value, Error> {
        let mangled = mangle_local(raw_name, self.local_scope);
        let name = mangled.as_str();

        match self.symtab.find(name) {
            Some(symbol) if symbol.flags == ez80_object::format::SymbolFlags::Extern => {
                Ok(Value { value: 0, symbol: Some((name.to_owned(), SymbolicTerm::External)), negated: false })
            }
            Some(symbol) if symbol.defined && symbol.section == Section::Abs => {
                Ok(Value::constant(symbol.value))
            }
            Some(symbol) if symbol.defined => Ok(Value {
                value: symbol.value,
                symbol: Some((name.to_owned(), SymbolicTerm::Local(symbol.section))),
                negated: false,
            }),
            _ if self.pass == Pass::One => {
                Ok(Value { value: 0, symbol: Some((name.to_owned(), SymbolicTerm::Local(Section::Code))), negated: false })
            }
            _ => Err(Error::UndefinedSymbol(at(
                self.file,
                cursor.line(),
                format!("`{name}` is not defined anywhere in this file"),
            ))),
        }
    }
}

fn add(lhs: Value, rhs: Value) -> Value {
    let value = lhs.value.wrapping_add(rhs.value) & 0x00FF_FFFF;

    match (lhs.symbol, rhs.symbol) {
        (Some(l), _) => Value { value, symbol: Some(l), negated: lhs.negated },
        (None, Some(r)) => Value { value, symbol: Some(r), negated: rhs.negated },
        (None, None) => Value::constant(value),
    }
}

fn sub(file: &std::path::Path, line: u32, lhs: Value, rhs: Value) -> Result<Value, Error> {
    let value = lhs.value.wrapping_sub(rhs.value) & 0x00FF_FFFF;

    Ok(match (lhs.symbol, rhs.symbol) {
        (Some((_, l_term)), Some((_, r_term))) if l_term == r_term && !lhs.negated && !rhs.negated => {
            Value::constant(value)
        }
        (Some(l), None) => Value { value, symbol: Some(l), negated: lhs.negated },
        (None, Some(r)) => Value { value, symbol: Some(r), negated: !rhs.negated },
        (Some(_), Some(_)) => {
            return Err(Error::InvalidOperands(at(
                file,
                line,
                "cannot subtract two relocatable symbols from different sections",
            )))
        }
        (None, None) => Value::constant(value),
    })
}

#[cfg(test)]
mod tests {
    use ez80_object::format::SymbolFlags;

    use super::*;
    use crate::lexer::tokenize;

    fn eval_str(symtab: &SymbolTable, pass: Pass, pc: u32, text: &str) -> Value {
        let file = std::path::Path::new("t.asm");
        let tokens = tokenize(file, 1, text).unwrap();
        let mut cursor = Cursor::new(&tokens);
        ExprContext::new(file, symtab, pass, pc, 0).eval(&mut cursor).unwrap()
    }

    #[test]
    fn test_constant_arithmetic() {
        let symtab = SymbolTable::new();
        let value = eval_str(&symtab, Pass::Two, 0, "1 + 2 * 3");
        assert_eq!(value.value, 7);
        assert!(value.symbol.is_none());
    }

    #[test]
    fn test_dollar_is_current_pc() {
        let symtab = SymbolTable::new();
        let value = eval_str(&symtab, Pass::Two, 0x100, "$");
        assert_eq!(value.value, 0x100);
    }

    #[test]
    fn test_subtracting_symbols_in_same_section_cancels() {
        let mut symtab = SymbolTable::new();
        symtab.define("foo", 0x100, Section::Code, Pass::One).unwrap();
        symtab.define("bar", 0x200, Section::Code, Pass::One).unwrap();

        let value = eval_str(&symtab, Pass::Two, 0, "bar - foo");
        assert_eq!(value.value, 0x100);
        assert!(value.symbol.is_none());
    }

    #[test]
    fn test_symbol_plus_offset_keeps_symbol() {
        let mut symtab = SymbolTable::new();
        symtab.define("foo", 0x100, Section::Code, Pass::One).unwrap();

        let value = eval_str(&symtab, Pass::Two, 0, "foo + 4");
        assert_eq!(value.value, 0x104);
        assert!(matches!(value.symbol, Some((ref name, SymbolicTerm::Local(Section::Code))) if name == "foo"));
    }

    #[test]
    fn test_undefined_symbol_in_pass_two_is_an_error() {
        let symtab = SymbolTable::new();
        let file = std::path::Path::new("t.asm");
        let tokens = tokenize(file, 1, "nope").unwrap();
        let mut cursor = Cursor::new(&tokens);

        assert!(ExprContext::new(file, &symtab, Pass::Two, 0, 0).eval(&mut cursor).is_err());
    }

    #[test]
    fn test_extern_symbol_is_symbolic_with_zero_value() {
        let mut symtab = SymbolTable::new();
        symtab.set_extern("ext").unwrap();

        let value = eval_str(&symtab, Pass::Two, 0, "ext");
        assert_eq!(value.value, 0);
        assert!(matches!(value.symbol, Some((_, SymbolicTerm::External))));
        assert!(symtab.find("ext").unwrap().flags == SymbolFlags::Extern);
    }
}
