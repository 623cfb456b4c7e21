//! Classifies one operand as a register, condition, immediate expression,
//! absolute address, indirect register, or index-plus-displacement, per the
//! leading token.

use crate::{
    error::{at, Error},
    expr::{ExprContext, Value},
    lexer::{Cursor, TokenKind},
};

/// A CPU register, including the eZ80 index-half and special registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    I,
    R,
    Mb,
    Af,
    Bc,
    De,
    Hl,
    Sp,
    Ix,
    Iy,
    AfPrime,
}

/// A branch condition, encoded 0-7 as the instruction set requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Nz = 0,
    Z = 1,
    Nc = 2,
    C = 3,
    Po = 4,
    Pe = 5,
    P = 6,
    M = 7,
}

/// A register accessed indirectly, i.e. written `(REG)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectRegister {
    Bc,
    De,
    Hl,
    Sp,
    Ix,
    Iy,
    C,
}

/// `IX` or `IY`, used by the index-plus-displacement operand form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRegister {
    Ix,
    Iy,
}

/// One fully classified operand.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A plain register.
    Register(Register),
    /// The bare identifier `C`, which is simultaneously a valid register and
    /// a valid condition; the consuming instruction handler decides which
    /// it needs.
    RegisterOrCondition,
    /// A named condition other than the ambiguous `C`.
    Condition(Condition),
    /// An immediate expression.
    Immediate(Value),
    /// `(expr)`, an absolute address.
    AbsoluteAddress(Value),
    /// `(REG)`.
    IndirectRegister(IndirectRegister),
    /// `(IX+d)` or `(IY+d)`, including the bare `IX+d` form used outside
    /// parentheses by `LEA`.
    IndexDisplacement(IndexRegister, Value),
}

fn parse_register(name: &str) -> Option<Register> {
    Some(match name.to_ascii_uppercase().as_str() {
        "A" => Register::A,
        "B" => Register::B,
        "C" => Register::C,
        "D" => Register::D,
        "E" => Register::E,
        "H" => Register::H,
        "L" => Register::L,
        "IXH" => Register::Ixh,
        "IXL" => Register::Ixl,
        "IYH" => Register::Iyh,
        "IYL" => Register::Iyl,
        "I" => Register::I,
        "R" => Register::R,
        "MB" => Register::Mb,
        "AF" => Register::Af,
        "BC" => Register::Bc,
        "DE" => Register::De,
        "HL" => Register::Hl,
        "SP" => Register::Sp,
        "IX" => Register::Ix,
        "IY" => Register::Iy,
        "AF'" => Register::AfPrime,
        _ => return None,
    })
}

fn parse_condition(name: &str) -> Option<Condition> {
    Some(match name.to_ascii_uppercase().as_str() {
        "NZ" => Condition::Nz,
        "Z" => Condition::Z,
        "NC" => Condition::Nc,
        "C" => Condition::C,
        "PO" => Condition::Po,
        "PE" => Condition::Pe,
        "P" => Condition::P,
        "M" => Condition::M,
        _ => return None,
    })
}

fn parse_indirect_register(name: &str) -> Option<IndirectRegister> {
    Some(match name.to_ascii_uppercase().as_str() {
        "BC" => IndirectRegister::Bc,
        "DE" => IndirectRegister::De,
        "HL" => IndirectRegister::Hl,
        "SP" => IndirectRegister::Sp,
        "IX" => IndirectRegister::Ix,
        "IY" => IndirectRegister::Iy,
        "C" => IndirectRegister::C,
        _ => return None,
    })
}

fn ident_text<'a>(cursor: &Cursor<'a>) -> Option<&'a str> {
    match cursor.peek() {
        TokenKind::Ident(text) => Some(text.as_str()),
        _ => None,
    }
}

fn index_register(name: &str) -> Option<IndexRegister> {
    match name.to_ascii_uppercase().as_str() {
        "IX" => Some(IndexRegister::Ix),
        "IY" => Some(IndexRegister::Iy),
        _ => None,
    }
}

/// Parses a single operand starting at the cursor.
pub fn parse_operand(ctx: &ExprContext, cursor: &mut Cursor) -> Result<Operand, Error> {
    if matches!(cursor.peek(), TokenKind::LParen) {
        return parse_indirect_operand(ctx, cursor);
    }

    if let Some(name) = ident_text(cursor) {
        if let Some(index) = index_register(name) {
            let saved = cursor.clone();
            cursor.advance();
            if matches!(cursor.peek(), TokenKind::Plus | TokenKind::Minus) {
                let displacement = ctx.eval(cursor)?;
                return Ok(Operand::IndexDisplacement(index, displacement));
            }
            *cursor = saved;
        }

        if let Some(register) = parse_register(name) {
            cursor.advance();
            return Ok(if register == Register::C {
                Operand::RegisterOrCondition
            } else {
                Operand::Register(register)
            });
        }

        if let Some(condition) = parse_condition(name) {
            cursor.advance();
            return Ok(Operand::Condition(condition));
        }
    }

    Ok(Operand::Immediate(ctx.eval(cursor)?))
}

fn parse_indirect_operand(ctx: &ExprContext, cursor: &mut Cursor) -> Result<Operand, Error> {
    cursor.advance(); // '('

    if let Some(name) = ident_text(cursor) {
        if let Some(index) = index_register(name) {
            let saved = cursor.clone();
            cursor.advance();
            if matches!(cursor.peek(), TokenKind::Plus | TokenKind::Minus) {
                let displacement = ctx.eval(cursor)?;
                expect_rparen(ctx, cursor)?;
                return Ok(Operand::IndexDisplacement(index, displacement));
            }
            if matches!(cursor.peek(), TokenKind::RParen) {
                cursor.advance();
                let register = if index == IndexRegister::Ix { IndirectRegister::Ix } else { IndirectRegister::Iy };
                return Ok(Operand::IndirectRegister(register));
            }
            *cursor = saved;
        } else if let Some(register) = parse_indirect_register(name) {
            let saved = cursor.clone();
            cursor.advance();
            if matches!(cursor.peek(), TokenKind::RParen) {
                cursor.advance();
                return Ok(Operand::IndirectRegister(register));
            }
            *cursor = saved;
        }
    }

    let value = ctx.eval(cursor)?;
    expect_rparen(ctx, cursor)?;
    Ok(Operand::AbsoluteAddress(value))
}

fn expect_rparen(ctx: &ExprContext, cursor: &mut Cursor) -> Result<(), Error> {
    if !matches!(cursor.peek(), TokenKind::RParen) {
        return Err(Error::ExpectedCloseParen(at(ctx.file(), cursor.line(), "expected `)` here")));
    }
    cursor.advance();
    Ok(())
}

/// Expects and consumes a comma, reporting an error pointing at the current
/// token if one isn't there.
pub fn expect_comma(ctx: &ExprContext, cursor: &mut Cursor) -> Result<(), Error> {
    if !matches!(cursor.peek(), TokenKind::Comma) {
        return Err(Error::ExpectedComma(at(ctx.file(), cursor.line(), "expected `,` here")));
    }
    cursor.advance();
    Ok(())
}

/// Ensures nothing but end-of-line remains, as every instruction/directive
/// handler must check once it has consumed all its operands.
pub fn expect_eol(ctx: &ExprContext, cursor: &mut Cursor) -> Result<(), Error> {
    if !cursor.at_eol() {
        return Err(Error::TrailingContent(at(
            ctx.file(),
            cursor.line(),
            "unexpected content after the instruction",
        )));
    }
    Ok(())
}
