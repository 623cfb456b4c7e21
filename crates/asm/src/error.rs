//! Errors the assembler can report, each tagged with the error code a user
//! can feed to `ez80asm --explain`.

use std::path::Path;

use ez80_errors::error;

/// Formats a diagnostic the way every assembler message is presented:
/// `<file>:<line>: <message>`.
pub(crate) fn at(file: &Path, line: u32, message: impl std::fmt::Display) -> String {
    format!("{}:{}: {}", file.display(), line, message)
}

error! {
    /// Everything that can go wrong while assembling a translation unit.
    pub enum Error {
        #[code = E010]
        #[message = "I could not open a source, include, or incbin file."]
        #[formatted_message("{0}")]
        #[help = "Check that the path exists and is readable from the current directory."]
        CannotOpenFile(String),

        #[code = E011]
        #[message = "I could not write the output object file."]
        #[formatted_message("{0}")]
        #[help = "Check that the output path is writable."]
        CannotWriteOutput(String),

        #[code = E020]
        #[message = "A string or character literal is too long or never closed."]
        #[formatted_message("{0}")]
        #[help = "Close the literal with a matching quote before the end of the line."]
        BadLiteral(String),

        #[code = E021]
        #[message = "An escape sequence inside a string or character literal is not recognized."]
        #[formatted_message("{0}")]
        #[help = "Supported escapes are \\n \\r \\t \\0 \\\\ and \\\"."]
        BadEscape(String),

        #[code = E030]
        #[message = "A comma was expected here."]
        #[formatted_message("{0}")]
        #[help = "Operands of this form are separated by commas."]
        ExpectedComma(String),

        #[code = E031]
        #[message = "A closing parenthesis was expected here."]
        #[formatted_message("{0}")]
        #[help = "Every `(` introducing an indirect operand needs a matching `)`."]
        ExpectedCloseParen(String),

        #[code = E032]
        #[message = "This mnemonic is not one I recognize."]
        #[formatted_message("{0}")]
        #[help = "Check the spelling, or consult the instruction set reference."]
        UnknownMnemonic(String),

        #[code = E033]
        #[message = "This directive is not one I recognize."]
        #[formatted_message("{0}")]
        #[help = "Check the spelling, or consult the directive reference."]
        UnknownDirective(String),

        #[code = E034]
        #[message = "There is unexpected content after a complete instruction or directive."]
        #[formatted_message("{0}")]
        #[help = "Remove the trailing tokens, or add a comma if another operand was intended."]
        TrailingContent(String),

        #[code = E035]
        #[message = "EQU or `=` was used without a preceding label."]
        #[formatted_message("{0}")]
        #[help = "Write `name: EQU expr` or `name EQU expr` on the same line."]
        EquWithoutLabel(String),

        #[code = E040]
        #[message = "This symbol is referenced but never defined."]
        #[formatted_message("{0}")]
        #[help = "Define the symbol somewhere in this translation unit, or mark it EXTERN."]
        UndefinedSymbol(String),

        #[code = E041]
        #[message = "This symbol is defined more than once, or redefined after being declared EXTERN."]
        #[formatted_message("{0}")]
        #[help = "Each symbol may be defined at most once per translation unit."]
        DuplicateDefinition(String),

        #[code = E042]
        #[message = "This combination of operands is not valid for this instruction."]
        #[formatted_message("{0}")]
        #[help = "IX and IY half registers cannot be mixed with each other, nor with H or L."]
        InvalidOperands(String),

        #[code = E043]
        #[message = "The branch target is too far away for an 8-bit relative displacement."]
        #[formatted_message("{0}")]
        #[help = "JR and DJNZ can only reach -128..127 bytes from the following instruction."]
        DisplacementOutOfRange(String),

        #[code = E044]
        #[message = "JR and DJNZ cannot target an external symbol."]
        #[formatted_message("{0}")]
        #[help = "A PC-relative displacement cannot be patched by the linker; use JP or CALL instead."]
        ExternalRelativeBranch(String),

        #[code = E045]
        #[message = "Division by zero in a constant expression."]
        #[formatted_message("{0}")]
        #[help = "Check the divisor; it evaluated to zero."]
        DivisionByZero(String),

        #[code = E046]
        #[message = "This is not a valid RST vector."]
        #[formatted_message("{0}")]
        #[help = "RST accepts 0x00, 0x08, ..., 0x38, or the shorthand forms 0..7."]
        InvalidRstVector(String),

        #[code = E047]
        #[message = "This is not a valid interrupt mode."]
        #[formatted_message("{0}")]
        #[help = "IM accepts 0, 1, or 2."]
        InvalidInterruptMode(String),

        #[code = E048]
        #[message = "ALIGN requires a power-of-two argument."]
        #[formatted_message("{0}")]
        #[help = "Use 2, 4, 8, 16, and so on."]
        AlignNotPowerOfTwo(String),

        #[code = E049]
        #[message = "IX and IY half registers cannot be mixed in the same instruction."]
        #[formatted_message("{0}")]
        #[help = "Use two IXH/IXL operands, or two IYH/IYL operands, never one of each."]
        MixedIndexHalves(String),

        #[code = E050]
        #[message = "The symbol table is full."]
        #[formatted_message("{0}")]
        #[help = "This translation unit defines or references too many distinct symbols."]
        SymbolTableFull(String),

        #[code = E051]
        #[message = "The external reference table is full."]
        #[formatted_message("{0}")]
        #[help = "This translation unit declares too many distinct EXTERN symbols."]
        ExternsTableFull(String),

        #[transparent]
        Io(#[from] std::io::Error),
    }
}
