//! The instruction encoder: a dispatch from (lowercased) mnemonic to a
//! handler, grouped the way the component design groups them. This is the
//! largest part of the assembler.

use crate::{
    error::{at, Error},
    expr::{ExprContext, SymbolicTerm, Value},
    lexer::{Cursor, TokenKind},
    operand::{expect_comma, expect_eol, parse_operand, Condition, IndexRegister, IndirectRegister, Operand, Register},
    section::Sections,
    symtab::Pass,
};

/// Mutable state an instruction handler needs: where to emit bytes, and the
/// context to evaluate operand expressions against.
pub struct InstrContext<'a, 'b> {
    /// Expression-evaluation context for this line.
    pub ctx: &'a ExprContext<'b>,
    /// The per-section byte streams and relocation stream.
    pub sections: &'a mut Sections,
}

impl<'a, 'b> InstrContext<'a, 'b> {
    fn line(&self, cursor: &Cursor) -> u32 {
        cursor.line()
    }

    fn invalid(&self, cursor: &Cursor, message: impl std::fmt::Display) -> Error {
        Error::InvalidOperands(at(self.ctx.file(), self.line(cursor), message))
    }

    fn byte(&mut self, b: u8) {
        self.sections.emit_byte(self.ctx.pass(), b);
    }

    fn bytes(&mut self, bs: &[u8]) {
        for &b in bs {
            self.byte(b);
        }
    }

    /// Emits a 24-bit little-endian value, recording a relocation first if
    /// the value carries a symbolic term.
    fn addr24(&mut self, cursor: &Cursor, value: &Value) -> Result<(), Error> {
        let line = self.line(cursor);
        self.sections.emit_addr24(self.ctx.file(), line, self.ctx.pass(), value)
    }
}

fn reg8_code(reg: Register) -> Option<(u8, Option<u8>)> {
    Some(match reg {
        Register::B => (0, None),
        Register::C => (1, None),
        Register::D => (2, None),
        Register::E => (3, None),
        Register::H => (4, None),
        Register::L => (5, None),
        Register::A => (7, None),
        Register::Ixh => (4, Some(0xDD)),
        Register::Ixl => (5, Some(0xDD)),
        Register::Iyh => (4, Some(0xFD)),
        Register::Iyl => (5, Some(0xFD)),
        _ => return None,
    })
}

fn is_h_or_l(reg: Register) -> bool {
    matches!(reg, Register::H | Register::L)
}

fn combine_prefix(
    ictx: &InstrContext,
    cursor: &Cursor,
    a: (u8, Option<u8>),
    a_reg: Register,
    b: (u8, Option<u8>),
    b_reg: Register,
) -> Result<Option<u8>, Error> {
    let prefix = match (a.1, b.1) {
        (Some(x), Some(y)) if x != y => {
            return Err(Error::MixedIndexHalves(at(
                ictx.ctx.file(),
                cursor.line(),
                "an instruction cannot mix an IX half-register with an IY half-register",
            )))
        }
        (Some(x), _) => Some(x),
        (_, Some(y)) => Some(y),
        (None, None) => None,
    };

    if prefix.is_some() && (is_h_or_l(a_reg) || is_h_or_l(b_reg)) {
        return Err(ictx.invalid(cursor, "H and L cannot be combined with an IX/IY half-register in the same instruction"));
    }

    Ok(prefix)
}

fn as_register(op: &Operand) -> Option<Register> {
    match op {
        Operand::Register(r) => Some(*r),
        Operand::RegisterOrCondition => Some(Register::C),
        _ => None,
    }
}

fn as_condition(op: &Operand) -> Option<Condition> {
    match op {
        Operand::Condition(c) => Some(*c),
        Operand::RegisterOrCondition => Some(Condition::C),
        _ => None,
    }
}

fn pair_code(reg: Register) -> Option<u8> {
    match reg {
        Register::Bc => Some(0),
        Register::De => Some(1),
        Register::Hl => Some(2),
        Register::Sp => Some(3),
        _ => None,
    }
}

fn push_pop_code(reg: Register) -> Option<u8> {
    match reg {
        Register::Bc => Some(0),
        Register::De => Some(1),
        Register::Hl => Some(2),
        Register::Af => Some(3),
        _ => None,
    }
}

/// No-operand mnemonics mapping to a fixed `(prefix, opcode)` byte pair. A
/// zero prefix means no prefix byte is emitted.
const SIMPLE: &[(&str, u8, u8)] = &[
    ("NOP", 0, 0x00),
    ("HALT", 0, 0x76),
    ("DI", 0, 0xF3),
    ("EI", 0, 0xFB),
    ("RLCA", 0, 0x07),
    ("RRCA", 0, 0x0F),
    ("RLA", 0, 0x17),
    ("RRA", 0, 0x1F),
    ("DAA", 0, 0x27),
    ("CPL", 0, 0x2F),
    ("SCF", 0, 0x37),
    ("CCF", 0, 0x3F),
    ("EXX", 0, 0xD9),
    ("LDI", 0xED, 0xA0),
    ("CPI", 0xED, 0xA1),
    ("INI", 0xED, 0xA2),
    ("OUTI", 0xED, 0xA3),
    ("LDD", 0xED, 0xA8),
    ("CPD", 0xED, 0xA9),
    ("IND", 0xED, 0xAA),
    ("OUTD", 0xED, 0xAB),
    ("LDIR", 0xED, 0xB0),
    ("CPIR", 0xED, 0xB1),
    ("INIR", 0xED, 0xB2),
    ("OTIR", 0xED, 0xB3),
    ("LDDR", 0xED, 0xB8),
    ("CPDR", 0xED, 0xB9),
    ("INDR", 0xED, 0xBA),
    ("OTDR", 0xED, 0xBB),
    ("NEG", 0xED, 0x44),
    ("RETN", 0xED, 0x45),
    ("RETI", 0xED, 0x4D),
    ("RLD", 0xED, 0x6F),
    ("RRD", 0xED, 0x67),
    ("SLP", 0xED, 0x76),
    ("STMIX", 0xED, 0x7D),
    ("RSMIX", 0xED, 0x7C),
];

/// Dispatches `mnemonic` (already uppercased, with any `.S`/`.LIL` suffix
/// intact) against the instruction table. Returns `Ok(false)` if the
/// mnemonic isn't recognized at all, so the caller can report "unknown
/// mnemonic" itself.
pub fn execute(ictx: &mut InstrContext, mnemonic: &str, cursor: &mut Cursor) -> Result<bool, Error> {
    if let Some(&(_, prefix, opcode)) = SIMPLE.iter().find(|(name, _, _)| *name == mnemonic) {
        if prefix != 0 {
            ictx.byte(prefix);
        }
        ictx.byte(opcode);
        expect_eol(ictx.ctx, cursor)?;
        return Ok(true);
    }

    let handled = match mnemonic {
        "LD" => execute_ld(ictx, cursor)?,
        "PUSH" => execute_push_pop(ictx, cursor, true)?,
        "POP" => execute_push_pop(ictx, cursor, false)?,
        "EX" => execute_ex(ictx, cursor)?,
        "ADD" | "ADC" | "SUB" | "SBC" | "AND" | "XOR" | "OR" | "CP" => execute_alu(ictx, cursor, mnemonic)?,
        "ADD.S" | "ADC.S" | "SBC.S" => execute_alu16(ictx, cursor, &mnemonic[..mnemonic.len() - 2], true)?,
        "INC" => execute_inc_dec(ictx, cursor, true)?,
        "DEC" => execute_inc_dec(ictx, cursor, false)?,
        "JP" => execute_jp(ictx, cursor)?,
        "JR" => execute_jr_djnz(ictx, cursor, 0x18, false)?,
        "DJNZ" => execute_jr_djnz(ictx, cursor, 0x10, true)?,
        "RET" => execute_ret(ictx, cursor)?,
        "CALL" => execute_call(ictx, cursor)?,
        "RST" => execute_rst(ictx, cursor, false)?,
        "RST.LIL" => execute_rst(ictx, cursor, true)?,
        "IN" => execute_in(ictx, cursor)?,
        "OUT" => execute_out(ictx, cursor)?,
        "IN0" => execute_in0_out0(ictx, cursor, true)?,
        "OUT0" => execute_in0_out0(ictx, cursor, false)?,
        "BIT" => execute_bit_set_res(ictx, cursor, None)?,
        "SET" => execute_bit_set_res(ictx, cursor, Some(0xC0))?,
        "RES" => execute_bit_set_res(ictx, cursor, Some(0x80))?,
        "RLC" | "RRC" | "RL" | "RR" | "SLA" | "SRA" | "SRL" => execute_shift(ictx, cursor, mnemonic)?,
        "LEA" => execute_lea(ictx, cursor)?,
        "PEA" => execute_pea(ictx, cursor)?,
        "MLT" => execute_mlt(ictx, cursor)?,
        "TST" => execute_tst(ictx, cursor)?,
        "IM" => execute_im(ictx, cursor)?,
        _ => return Ok(false),
    };

    let _ = handled;
    expect_eol(ictx.ctx, cursor)?;
    Ok(true)
}

fn operand(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<Operand, Error> {
    parse_operand(ictx.ctx, cursor)
}

fn execute_ld(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let dst = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let src = operand(ictx, cursor)?;

    // (1) 8-bit register-to-register, including index halves.
    if let (Some(d), Some(s)) = (as_register(&dst), as_register(&src)) {
        if let (Some(dc), Some(sc)) = (reg8_code(d), reg8_code(s)) {
            let prefix = combine_prefix(ictx, cursor, dc, d, sc, s)?;
            if let Some(p) = prefix {
                ictx.byte(p);
            }
            ictx.byte(0x40 | (dc.0 << 3) | sc.0);
            return Ok(true);
        }
    }

    // (2) fixed special pairs.
    match (&dst, &src) {
        (Operand::Register(Register::Sp), Operand::Register(Register::Hl)) => {
            ictx.byte(0xF9);
            return Ok(true);
        }
        (Operand::Register(Register::Sp), Operand::Register(Register::Ix)) => {
            ictx.bytes(&[0xDD, 0xF9]);
            return Ok(true);
        }
        (Operand::Register(Register::Sp), Operand::Register(Register::Iy)) => {
            ictx.bytes(&[0xFD, 0xF9]);
            return Ok(true);
        }
        (Operand::Register(Register::I), Operand::Register(Register::A)) => {
            ictx.bytes(&[0xED, 0x47]);
            return Ok(true);
        }
        (Operand::Register(Register::R), Operand::Register(Register::A)) => {
            ictx.bytes(&[0xED, 0x4F]);
            return Ok(true);
        }
        (Operand::Register(Register::Mb), Operand::Register(Register::A)) => {
            ictx.bytes(&[0xED, 0x6D]);
            return Ok(true);
        }
        (Operand::Register(Register::A), Operand::Register(Register::I)) => {
            ictx.bytes(&[0xED, 0x57]);
            return Ok(true);
        }
        (Operand::Register(Register::A), Operand::Register(Register::R)) => {
            ictx.bytes(&[0xED, 0x5F]);
            return Ok(true);
        }
        (Operand::Register(Register::A), Operand::Register(Register::Mb)) => {
            ictx.bytes(&[0xED, 0x6E]);
            return Ok(true);
        }
        _ => {}
    }

    // (3) 8-bit immediate to register.
    if let Some(d) = as_register(&dst) {
        if let (Some(dc), Operand::Immediate(value)) = (reg8_code(d), &src) {
            if let Some(p) = dc.1 {
                ictx.byte(p);
            }
            ictx.byte(0x06 | (dc.0 << 3));
            ictx.byte((value.value & 0xFF) as u8);
            return Ok(true);
        }
    }

    // (4)/(5) 16-bit immediate to register pair or IX/IY.
    if let Operand::Immediate(value) = &src {
        if let Operand::Register(reg @ (Register::Bc | Register::De | Register::Hl | Register::Sp)) = dst {
            let dd = pair_code(reg).unwrap();
            ictx.byte(0x01 | (dd << 4));
            ictx.addr24(cursor, value)?;
            return Ok(true);
        }
        if let Operand::Register(Register::Ix) = dst {
            ictx.bytes(&[0xDD, 0x21]);
            ictx.addr24(cursor, value)?;
            return Ok(true);
        }
        if let Operand::Register(Register::Iy) = dst {
            ictx.bytes(&[0xFD, 0x21]);
            ictx.addr24(cursor, value)?;
            return Ok(true);
        }
    }

    // (6)/(7) load/store through (HL), (IX+d), (IY+d).
    if let Some(bytes) = encode_indirect_load_store(ictx, cursor, &dst, &src)? {
        ictx.bytes(&bytes.0);
        if let Some(displacement) = bytes.1 {
            ictx.byte(displacement);
        }
        return Ok(true);
    }

    // (8) A <-> (BC)/(DE).
    match (&dst, &src) {
        (Operand::Register(Register::A), Operand::IndirectRegister(IndirectRegister::Bc)) => {
            ictx.byte(0x0A);
            return Ok(true);
        }
        (Operand::Register(Register::A), Operand::IndirectRegister(IndirectRegister::De)) => {
            ictx.byte(0x1A);
            return Ok(true);
        }
        (Operand::IndirectRegister(IndirectRegister::Bc), Operand::Register(Register::A)) => {
            ictx.byte(0x02);
            return Ok(true);
        }
        (Operand::IndirectRegister(IndirectRegister::De), Operand::Register(Register::A)) => {
            ictx.byte(0x12);
            return Ok(true);
        }
        _ => {}
    }

    // (9) A/HL/dd/IX/IY <-> (nn).
    match (&dst, &src) {
        (Operand::Register(Register::A), Operand::AbsoluteAddress(addr)) => {
            ictx.byte(0x3A);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::AbsoluteAddress(addr), Operand::Register(Register::A)) => {
            ictx.byte(0x32);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::Register(Register::Hl), Operand::AbsoluteAddress(addr)) => {
            ictx.byte(0x2A);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::AbsoluteAddress(addr), Operand::Register(Register::Hl)) => {
            ictx.byte(0x22);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::Register(reg @ (Register::Bc | Register::De | Register::Sp)), Operand::AbsoluteAddress(addr)) => {
            let dd = pair_code(*reg).unwrap();
            ictx.bytes(&[0xED, 0x4B | (dd << 4)]);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::AbsoluteAddress(addr), Operand::Register(reg @ (Register::Bc | Register::De | Register::Sp))) => {
            let dd = pair_code(*reg).unwrap();
            ictx.bytes(&[0xED, 0x43 | (dd << 4)]);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::Register(Register::Ix), Operand::AbsoluteAddress(addr)) => {
            ictx.bytes(&[0xDD, 0x2A]);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::AbsoluteAddress(addr), Operand::Register(Register::Ix)) => {
            ictx.bytes(&[0xDD, 0x22]);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::Register(Register::Iy), Operand::AbsoluteAddress(addr)) => {
            ictx.bytes(&[0xFD, 0x2A]);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        (Operand::AbsoluteAddress(addr), Operand::Register(Register::Iy)) => {
            ictx.bytes(&[0xFD, 0x22]);
            ictx.addr24(cursor, addr)?;
            return Ok(true);
        }
        _ => {}
    }

    Err(ictx.invalid(cursor, "this combination of operands is not valid for LD"))
}

/// Returns `(bytes-before-displacement, optional-displacement-byte)` for the
/// (6)/(7) family: 16-bit and 8-bit register transfers through `(HL)`,
/// `(IX+d)`, `(IY+d)`.
fn encode_indirect_load_store(
    ictx: &InstrContext,
    cursor: &Cursor,
    dst: &Operand,
    src: &Operand,
) -> Result<Option<(Vec<u8>, Option<u8>)>, Error> {
    // 16-bit register through (HL)/(IX+d)/(IY+d): the eZ80 table is regular
    // for BC/DE/HL but irregular for IX/IY.
    let sixteen = |reg: Register| -> Option<u8> {
        match reg {
            Register::Bc => Some(0x07),
            Register::De => Some(0x17),
            Register::Hl => Some(0x27),
            _ => None,
        }
    };

    if let Operand::Register(reg) = dst {
        if let Some(base) = sixteen(*reg) {
            match src {
                Operand::IndirectRegister(IndirectRegister::Hl) => return Ok(Some((vec![0xED, base], None))),
                Operand::IndexDisplacement(index, d) => {
                    let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
                    let disp = (d.value & 0xFF) as u8;
                    return Ok(Some((vec![prefix, 0xED, base], Some(disp))));
                }
                _ => {}
            }
        }
    }
    if let Operand::Register(reg) = src {
        if let Some(base) = sixteen(*reg) {
            match dst {
                Operand::IndirectRegister(IndirectRegister::Hl) => {
                    return Ok(Some((vec![0xED, base | 0x08], None)))
                }
                Operand::IndexDisplacement(index, d) => {
                    let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
                    let disp = (d.value & 0xFF) as u8;
                    return Ok(Some((vec![prefix, 0xED, base | 0x08], Some(disp))));
                }
                _ => {}
            }
        }
    }

    // 8-bit register through (HL)/(IX+d)/(IY+d).
    if let Operand::Register(reg) = dst {
        if let Some((code, None)) = reg8_code(*reg) {
            match src {
                Operand::IndirectRegister(IndirectRegister::Hl) => {
                    return Ok(Some((vec![0x46 | (code << 3)], None)))
                }
                Operand::IndexDisplacement(index, d) => {
                    let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
                    return Ok(Some((vec![prefix, 0x46 | (code << 3)], Some((d.value & 0xFF) as u8))));
                }
                _ => {}
            }
        }
    }
    if let Operand::Register(reg) = src {
        if let Some((code, None)) = reg8_code(*reg) {
            match dst {
                Operand::IndirectRegister(IndirectRegister::Hl) => {
                    return Ok(Some((vec![0x70 | code], None)))
                }
                Operand::IndexDisplacement(index, d) => {
                    let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
                    return Ok(Some((vec![prefix, 0x70 | code], Some((d.value & 0xFF) as u8))));
                }
                _ => {}
            }
        }
    }

    // LD (HL),n / LD (IX+d),n / LD (IY+d),n.
    if let Operand::Immediate(value) = src {
        match dst {
            Operand::IndirectRegister(IndirectRegister::Hl) => {
                return Ok(Some((vec![0x36, (value.value & 0xFF) as u8], None)))
            }
            Operand::IndexDisplacement(index, d) => {
                let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
                return Ok(Some((
                    vec![prefix, 0x36, (d.value & 0xFF) as u8, (value.value & 0xFF) as u8],
                    None,
                )));
            }
            _ => {}
        }
    }

    let _ = (ictx, cursor);
    Ok(None)
}

fn execute_push_pop(ictx: &mut InstrContext, cursor: &mut Cursor, push: bool) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;
    match op {
        Operand::Register(reg) if push_pop_code(reg).is_some() => {
            let qq = push_pop_code(reg).unwrap();
            ictx.byte(if push { 0xC5 } else { 0xC1 } | (qq << 4));
        }
        Operand::Register(Register::Ix) => {
            ictx.bytes(&[0xDD, if push { 0xE5 } else { 0xE1 }]);
        }
        Operand::Register(Register::Iy) => {
            ictx.bytes(&[0xFD, if push { 0xE5 } else { 0xE1 }]);
        }
        _ => return Err(ictx.invalid(cursor, "expected BC, DE, HL, AF, IX, or IY")),
    }
    Ok(true)
}

fn execute_ex(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let dst = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let src = operand(ictx, cursor)?;

    match (&dst, &src) {
        (Operand::Register(Register::Af), Operand::Register(Register::AfPrime)) => ictx.byte(0x08),
        (Operand::Register(Register::De), Operand::Register(Register::Hl)) => ictx.byte(0xEB),
        (Operand::IndirectRegister(IndirectRegister::Sp), Operand::Register(Register::Hl)) => ictx.byte(0xE3),
        (Operand::IndirectRegister(IndirectRegister::Sp), Operand::Register(Register::Ix)) => {
            ictx.bytes(&[0xDD, 0xE3])
        }
        (Operand::IndirectRegister(IndirectRegister::Sp), Operand::Register(Register::Iy)) => {
            ictx.bytes(&[0xFD, 0xE3])
        }
        _ => return Err(ictx.invalid(cursor, "expected AF,AF', DE,HL, or (SP),HL/IX/IY")),
    }
    Ok(true)
}

fn alu_op_code(mnemonic: &str) -> u8 {
    match mnemonic {
        "ADD" => 0,
        "ADC" => 1,
        "SUB" => 2,
        "SBC" => 3,
        "AND" => 4,
        "XOR" => 5,
        "OR" => 6,
        "CP" => 7,
        _ => unreachable!(),
    }
}

fn execute_alu(ictx: &mut InstrContext, cursor: &mut Cursor, mnemonic: &str) -> Result<bool, Error> {
    let first = operand(ictx, cursor)?;

    // ADD/ADC/SBC HL|IX|IY, ss: the 16-bit forms, recognized by their
    // destination register before ever considering the `A,` prefix.
    if matches!(mnemonic, "ADD" | "ADC" | "SBC") {
        if let Some(reg @ (Register::Hl | Register::Ix | Register::Iy)) = as_register(&first) {
            expect_comma(ictx.ctx, cursor)?;
            let src = operand(ictx, cursor)?;
            let src_reg = as_register(&src).ok_or_else(|| ictx.invalid(cursor, "expected a 16-bit register"))?;
            return emit_alu16(ictx, cursor, mnemonic, reg, src_reg);
        }
    }

    // 8-bit forms accept an optional `A,` prefix.
    let target = if matches!(first, Operand::Register(Register::A)) && matches!(cursor.peek(), TokenKind::Comma) {
        expect_comma(ictx.ctx, cursor)?;
        operand(ictx, cursor)?
    } else {
        first
    };

    let op = alu_op_code(mnemonic);

    if let Some(reg) = as_register(&target) {
        if let Some((code, prefix)) = reg8_code(reg) {
            if let Some(p) = prefix {
                ictx.byte(p);
            }
            ictx.byte(0x80 | (op << 3) | code);
            return Ok(true);
        }
    }

    match &target {
        Operand::Immediate(value) => {
            ictx.byte(0xC6 | (op << 3));
            ictx.byte((value.value & 0xFF) as u8);
        }
        Operand::IndirectRegister(IndirectRegister::Hl) => {
            ictx.byte(0x86 | (op << 3));
        }
        Operand::IndexDisplacement(index, d) => {
            let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
            ictx.bytes(&[prefix, 0x86 | (op << 3), (d.value & 0xFF) as u8]);
        }
        _ => return Err(ictx.invalid(cursor, "invalid operand for this ALU instruction")),
    }

    Ok(true)
}

fn execute_alu16(ictx: &mut InstrContext, cursor: &mut Cursor, mnemonic: &str, short: bool) -> Result<bool, Error> {
    let dst = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let src = operand(ictx, cursor)?;

    let dst_reg = as_register(&dst).ok_or_else(|| ictx.invalid(cursor, "expected HL, IX, or IY"))?;
    let src_reg = as_register(&src).ok_or_else(|| ictx.invalid(cursor, "expected a 16-bit register"))?;

    if short {
        ictx.byte(0x52);
    }

    emit_alu16(ictx, cursor, mnemonic, dst_reg, src_reg)
}

fn emit_alu16(
    ictx: &mut InstrContext,
    cursor: &mut Cursor,
    mnemonic: &str,
    dst_reg: Register,
    src_reg: Register,
) -> Result<bool, Error> {
    match (mnemonic, dst_reg) {
        ("ADD", Register::Hl) => {
            let ss = pair_code(src_reg).ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, HL, or SP"))?;
            ictx.byte(0x09 | (ss << 4));
        }
        ("ADC", Register::Hl) => {
            let ss = pair_code(src_reg).ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, HL, or SP"))?;
            ictx.bytes(&[0xED, 0x4A | (ss << 4)]);
        }
        ("SBC", Register::Hl) => {
            let ss = pair_code(src_reg).ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, HL, or SP"))?;
            ictx.bytes(&[0xED, 0x42 | (ss << 4)]);
        }
        ("ADD", Register::Ix) => {
            let pp = index_add_code(src_reg, Register::Ix)
                .ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, IX, or SP"))?;
            ictx.bytes(&[0xDD, 0x09 | (pp << 4)]);
        }
        ("ADD", Register::Iy) => {
            let rr = index_add_code(src_reg, Register::Iy)
                .ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, IY, or SP"))?;
            ictx.bytes(&[0xFD, 0x09 | (rr << 4)]);
        }
        _ => return Err(ictx.invalid(cursor, "invalid 16-bit arithmetic operand combination")),
    }

    Ok(true)
}

fn index_add_code(src: Register, index: Register) -> Option<u8> {
    Some(match src {
        Register::Bc => 0,
        Register::De => 1,
        r if r == index => 2,
        Register::Sp => 3,
        _ => return None,
    })
}

fn execute_inc_dec(ictx: &mut InstrContext, cursor: &mut Cursor, inc: bool) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;

    if let Some(reg) = as_register(&op) {
        if let Some((code, prefix)) = reg8_code(reg) {
            if let Some(p) = prefix {
                ictx.byte(p);
            }
            ictx.byte((if inc { 0x04 } else { 0x05 }) | (code << 3));
            return Ok(true);
        }
        if let Some(ss) = pair_code(reg) {
            ictx.byte((if inc { 0x03 } else { 0x0B }) | (ss << 4));
            return Ok(true);
        }
        if reg == Register::Ix {
            ictx.bytes(&[0xDD, if inc { 0x23 } else { 0x2B }]);
            return Ok(true);
        }
        if reg == Register::Iy {
            ictx.bytes(&[0xFD, if inc { 0x23 } else { 0x2B }]);
            return Ok(true);
        }
    }

    match op {
        Operand::IndirectRegister(IndirectRegister::Hl) => {
            ictx.byte(if inc { 0x34 } else { 0x35 });
        }
        Operand::IndexDisplacement(index, d) => {
            let prefix = if index == IndexRegister::Ix { 0xDD } else { 0xFD };
            ictx.bytes(&[prefix, if inc { 0x34 } else { 0x35 }, (d.value & 0xFF) as u8]);
        }
        _ => return Err(ictx.invalid(cursor, "invalid operand for INC/DEC")),
    }

    Ok(true)
}

fn execute_jp(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let first = operand(ictx, cursor)?;

    if let Some(cc) = as_condition(&first) {
        if matches!(cursor.peek(), TokenKind::Comma) {
            expect_comma(ictx.ctx, cursor)?;
            let addr = operand(ictx, cursor)?;
            let Operand::Immediate(value) | Operand::AbsoluteAddress(value) = addr else {
                return Err(ictx.invalid(cursor, "expected an address after the condition"));
            };
            ictx.byte(0xC2 | ((cc as u8) << 3));
            ictx.addr24(cursor, &value)?;
            return Ok(true);
        }
    }

    match first {
        Operand::IndirectRegister(IndirectRegister::Hl) => ictx.byte(0xE9),
        Operand::IndirectRegister(IndirectRegister::Ix) => ictx.bytes(&[0xDD, 0xE9]),
        Operand::IndirectRegister(IndirectRegister::Iy) => ictx.bytes(&[0xFD, 0xE9]),
        Operand::Immediate(value) | Operand::AbsoluteAddress(value) => {
            ictx.byte(0xC3);
            ictx.addr24(cursor, &value)?;
        }
        _ => return Err(ictx.invalid(cursor, "invalid operand for JP")),
    }

    Ok(true)
}

fn execute_jr_djnz(ictx: &mut InstrContext, cursor: &mut Cursor, opcode: u8, is_djnz: bool) -> Result<bool, Error> {
    let first = operand(ictx, cursor)?;

    let (cc, target) = if !is_djnz {
        if let Some(cc) = as_condition(&first) {
            if matches!(cursor.peek(), TokenKind::Comma) {
                expect_comma(ictx.ctx, cursor)?;
                (Some(cc), operand(ictx, cursor)?)
            } else {
                (None, first)
            }
        } else {
            (None, first)
        }
    } else {
        (None, first)
    };

    let Operand::Immediate(value) = target else {
        return Err(ictx.invalid(cursor, "expected a branch target"));
    };

    if value.symbol.as_ref().is_some_and(|(_, term)| matches!(term, SymbolicTerm::External)) {
        return Err(Error::ExternalRelativeBranch(at(
            ictx.ctx.file(),
            cursor.line(),
            "JR/DJNZ cannot target an external symbol",
        )));
    }

    let base_opcode = match cc {
        Some(cc) if matches!(cc, Condition::Nz | Condition::Z | Condition::Nc | Condition::C) => {
            0x20 | ((cc as u8) << 3)
        }
        Some(_) => return Err(ictx.invalid(cursor, "JR only accepts NZ, Z, NC, or C")),
        None => opcode,
    };

    // Displacement = target - (pc_of_opcode + 2): one byte for the opcode,
    // one for the displacement itself.
    let pc_after = ictx.ctx.pc().wrapping_add(2) as i64;
    let target_value = i64::from(value.value);
    let displacement = target_value - pc_after;

    if ictx.ctx.pass() == Pass::Two && !(-128..=127).contains(&displacement) {
        return Err(Error::DisplacementOutOfRange(at(
            ictx.ctx.file(),
            cursor.line(),
            format!("branch displacement of {displacement} does not fit in a signed 8-bit value"),
        )));
    }

    ictx.byte(base_opcode);
    ictx.byte((displacement as i8 as u8).wrapping_add(0));

    Ok(true)
}

fn execute_call(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let first = operand(ictx, cursor)?;

    if let Some(cc) = as_condition(&first) {
        if matches!(cursor.peek(), TokenKind::Comma) {
            expect_comma(ictx.ctx, cursor)?;
            let addr = operand(ictx, cursor)?;
            let Operand::Immediate(value) | Operand::AbsoluteAddress(value) = addr else {
                return Err(ictx.invalid(cursor, "expected an address after the condition"));
            };
            ictx.byte(0xC4 | ((cc as u8) << 3));
            ictx.addr24(cursor, &value)?;
            return Ok(true);
        }
    }

    let Operand::Immediate(value) | Operand::AbsoluteAddress(value) = first else {
        return Err(ictx.invalid(cursor, "invalid operand for CALL"));
    };
    ictx.byte(0xCD);
    ictx.addr24(cursor, &value)?;
    Ok(true)
}

/// Handles both bare `RET` and `RET cc`.
fn execute_ret_cc(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    if cursor.at_eol() {
        ictx.byte(0xC9);
        return Ok(true);
    }

    let op = operand(ictx, cursor)?;
    let cc = as_condition(&op).ok_or_else(|| ictx.invalid(cursor, "expected a condition"))?;
    ictx.byte(0xC0 | ((cc as u8) << 3));
    Ok(true)
}

fn execute_rst(ictx: &mut InstrContext, cursor: &mut Cursor, lil: bool) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;
    let Operand::Immediate(value) = op else {
        return Err(ictx.invalid(cursor, "expected a constant RST vector"));
    };

    let vector = match value.value {
        n @ (0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38) => n as u8,
        n @ 0..=7 => (n << 3) as u8,
        n => {
            return Err(Error::InvalidRstVector(at(
                ictx.ctx.file(),
                cursor.line(),
                format!("{n:#04X} is not a valid RST vector"),
            )))
        }
    };

    if lil {
        ictx.byte(0x5B);
    }
    ictx.byte(0xC7 | vector);
    Ok(true)
}

fn execute_in(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let dst = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let src = operand(ictx, cursor)?;

    match (&dst, &src) {
        (Operand::Register(Register::A), Operand::AbsoluteAddress(value)) => {
            ictx.byte(0xDB);
            ictx.byte((value.value & 0xFF) as u8);
        }
        (_, Operand::IndirectRegister(IndirectRegister::C)) => {
            let reg = as_register(&dst).ok_or_else(|| ictx.invalid(cursor, "expected an 8-bit register"))?;
            let (code, _) = reg8_code(reg).ok_or_else(|| ictx.invalid(cursor, "expected an 8-bit register"))?;
            ictx.bytes(&[0xED, 0x40 | (code << 3)]);
        }
        _ => return Err(ictx.invalid(cursor, "invalid operand for IN")),
    }
    Ok(true)
}

fn execute_out(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let dst = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let src = operand(ictx, cursor)?;

    match (&dst, &src) {
        (Operand::AbsoluteAddress(value), Operand::Register(Register::A)) => {
            ictx.byte(0xD3);
            ictx.byte((value.value & 0xFF) as u8);
        }
        (Operand::IndirectRegister(IndirectRegister::C), _) => {
            let reg = as_register(&src).ok_or_else(|| ictx.invalid(cursor, "expected an 8-bit register"))?;
            let (code, _) = reg8_code(reg).ok_or_else(|| ictx.invalid(cursor, "expected an 8-bit register"))?;
            ictx.bytes(&[0xED, 0x41 | (code << 3)]);
        }
        _ => return Err(ictx.invalid(cursor, "invalid operand for OUT")),
    }
    Ok(true)
}

fn execute_in0_out0(ictx: &mut InstrContext, cursor: &mut Cursor, is_in: bool) -> Result<bool, Error> {
    let (reg_operand, port_operand) = if is_in {
        let dst = operand(ictx, cursor)?;
        expect_comma(ictx.ctx, cursor)?;
        let src = operand(ictx, cursor)?;
        (dst, src)
    } else {
        let dst = operand(ictx, cursor)?;
        expect_comma(ictx.ctx, cursor)?;
        let src = operand(ictx, cursor)?;
        (src, dst)
    };

    let reg = as_register(&reg_operand).ok_or_else(|| ictx.invalid(cursor, "expected an 8-bit register"))?;
    let (code, _) = reg8_code(reg).ok_or_else(|| ictx.invalid(cursor, "IN0/OUT0 do not accept (HL)"))?;
    let Operand::AbsoluteAddress(value) = port_operand else {
        return Err(ictx.invalid(cursor, "expected a port address"));
    };

    ictx.byte(0xED);
    ictx.byte((code << 3) | u8::from(!is_in));
    ictx.byte((value.value & 0xFF) as u8);
    Ok(true)
}

fn execute_bit_set_res(ictx: &mut InstrContext, cursor: &mut Cursor, base: Option<u8>) -> Result<bool, Error> {
    let bit_operand = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let target = operand(ictx, cursor)?;

    let Operand::Immediate(bit_value) = bit_operand else {
        return Err(ictx.invalid(cursor, "expected a bit number 0-7"));
    };
    if bit_value.value > 7 {
        return Err(ictx.invalid(cursor, "bit number must be 0-7"));
    }
    let bit = bit_value.value as u8;
    let base = base.unwrap_or(0x40); // BIT

    emit_cb(ictx, cursor, base | (bit << 3), &target)
}

fn execute_shift(ictx: &mut InstrContext, cursor: &mut Cursor, mnemonic: &str) -> Result<bool, Error> {
    let target = operand(ictx, cursor)?;
    let base = match mnemonic {
        "RLC" => 0x00,
        "RRC" => 0x08,
        "RL" => 0x10,
        "RR" => 0x18,
        "SLA" => 0x20,
        "SRA" => 0x28,
        "SRL" => 0x38,
        _ => unreachable!(),
    };
    emit_cb(ictx, cursor, base, &target)
}

fn emit_cb(ictx: &mut InstrContext, cursor: &mut Cursor, base: u8, target: &Operand) -> Result<bool, Error> {
    if let Some(reg) = as_register(target) {
        if let Some((code, None)) = reg8_code(reg) {
            ictx.bytes(&[0xCB, base | code]);
            return Ok(true);
        }
    }

    match target {
        Operand::IndirectRegister(IndirectRegister::Hl) => {
            ictx.bytes(&[0xCB, base | 6]);
        }
        Operand::IndexDisplacement(index, d) => {
            let prefix = if *index == IndexRegister::Ix { 0xDD } else { 0xFD };
            ictx.bytes(&[prefix, 0xCB, (d.value & 0xFF) as u8, base | 6]);
        }
        _ => return Err(ictx.invalid(cursor, "invalid operand for this bit/shift instruction")),
    }

    Ok(true)
}

fn execute_lea(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let dst = operand(ictx, cursor)?;
    expect_comma(ictx.ctx, cursor)?;
    let src = operand(ictx, cursor)?;

    let Operand::IndexDisplacement(index, d) = src else {
        return Err(ictx.invalid(cursor, "expected (IX+d) or (IY+d) as the source of LEA"));
    };
    let from_iy = index == IndexRegister::Iy;

    // ED-prefixed only: no DD/FD prefix. The opcode itself distinguishes
    // whether the displacement is taken off IX or IY.
    let opcode = match as_register(&dst) {
        Some(Register::Bc) => 0x02 | u8::from(from_iy),
        Some(Register::De) => 0x12 | u8::from(from_iy),
        Some(Register::Hl) => 0x22 | u8::from(from_iy),
        Some(Register::Ix) if from_iy => 0x54,
        Some(Register::Ix) => 0x32,
        Some(Register::Iy) if from_iy => 0x33,
        Some(Register::Iy) => 0x55,
        _ => return Err(ictx.invalid(cursor, "invalid destination register for LEA")),
    };

    ictx.bytes(&[0xED, opcode, (d.value & 0xFF) as u8]);
    Ok(true)
}

fn execute_pea(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;
    let Operand::IndexDisplacement(index, d) = op else {
        return Err(ictx.invalid(cursor, "expected (IX+d) or (IY+d)"));
    };
    let opcode = if index == IndexRegister::Ix { 0x65 } else { 0x66 };
    ictx.bytes(&[0xED, opcode, (d.value & 0xFF) as u8]);
    Ok(true)
}

fn execute_mlt(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;
    let reg = as_register(&op).ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, HL, or SP"))?;
    let ss = pair_code(reg).ok_or_else(|| ictx.invalid(cursor, "expected BC, DE, HL, or SP"))?;
    ictx.bytes(&[0xED, 0x4C | (ss << 4)]);
    Ok(true)
}

fn execute_tst(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;

    if let Some(reg) = as_register(&op) {
        if let Some((code, None)) = reg8_code(reg) {
            ictx.bytes(&[0xED, 0x04 | (code << 3)]);
            return Ok(true);
        }
    }

    match op {
        Operand::Immediate(value) => {
            ictx.bytes(&[0xED, 0x64]);
            ictx.byte((value.value & 0xFF) as u8);
        }
        _ => return Err(ictx.invalid(cursor, "expected an 8-bit register or immediate")),
    }

    Ok(true)
}

fn execute_im(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    let op = operand(ictx, cursor)?;
    let Operand::Immediate(value) = op else {
        return Err(ictx.invalid(cursor, "expected 0, 1, or 2"));
    };
    let opcode = match value.value {
        0 => 0x46,
        1 => 0x56,
        2 => 0x5E,
        n => {
            return Err(Error::InvalidInterruptMode(at(
                ictx.ctx.file(),
                cursor.line(),
                format!("{n} is not a valid interrupt mode"),
            )))
        }
    };
    ictx.bytes(&[0xED, opcode]);
    Ok(true)
}

// `RET cc` is dispatched from the top-level `execute` below, alongside the
// bare `RET` already covered by the simple-instruction table.
pub(crate) fn execute_ret(ictx: &mut InstrContext, cursor: &mut Cursor) -> Result<bool, Error> {
    execute_ret_cc(ictx, cursor)
}
