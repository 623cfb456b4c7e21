//! The section model: three predefined sections (CODE, DATA, BSS), each
//! with its own program counter, saved and restored across `SECTION`
//! switches, plus the relocation stream pass 2 accumulates.

use ez80_object::format::{RelocationTarget, RelocationType, Section};

use crate::{
    error::{at, Error},
    expr::{SymbolicTerm, Value},
    symtab::Pass,
};

/// One relocation, in the form the assembler accumulates it: the wire
/// format's fields, before the string table exists to carry the external
/// name, so it is carried here as a plain string instead of an index.
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Byte offset of the relocated slot within `section`'s byte stream.
    pub offset: u32,
    /// The section containing the relocated slot.
    pub section: Section,
    /// The relocation kind; always [`RelocationType::Addr24`] today.
    pub kind: RelocationType,
    /// What the relocation resolves to.
    pub target: RelocationTarget,
    /// The external symbol's name, when `target` is
    /// [`RelocationTarget::External`].
    pub external_name: Option<String>,
}

/// One section's byte stream and program counter.
#[derive(Debug, Default)]
struct SectionState {
    pc: u32,
    bytes: Vec<u8>,
}

/// Tracks the three sections' program counters and byte streams, the
/// currently selected section, and the relocation stream.
#[derive(Debug)]
pub struct Sections {
    code: SectionState,
    data: SectionState,
    bss: SectionState,
    current: Section,
    relocations: Vec<Relocation>,
}

impl Default for Sections {
    fn default() -> Self {
        Self::new()
    }
}

impl Sections {
    /// Creates a fresh section state with every PC at zero and CODE
    /// selected.
    pub fn new() -> Self {
        Self {
            code: SectionState::default(),
            data: SectionState::default(),
            bss: SectionState::default(),
            current: Section::Code,
            relocations: Vec::new(),
        }
    }

    fn state(&self, section: Section) -> &SectionState {
        match section {
            Section::Code => &self.code,
            Section::Data => &self.data,
            Section::Bss => &self.bss,
            Section::Abs => unreachable!("ABS has no byte stream"),
        }
    }

    fn state_mut(&mut self, section: Section) -> &mut SectionState {
        match section {
            Section::Code => &mut self.code,
            Section::Data => &mut self.data,
            Section::Bss => &mut self.bss,
            Section::Abs => unreachable!("ABS has no byte stream"),
        }
    }

    /// The currently selected section.
    pub fn current(&self) -> Section {
        self.current
    }

    /// The program counter of the currently selected section.
    pub fn pc(&self) -> u32 {
        self.state(self.current).pc
    }

    /// Switches to `section`, saving the outgoing section's PC and
    /// restoring the incoming one's.
    pub fn switch_to(&mut self, section: Section) {
        self.current = section;
    }

    /// Sets the current section's PC directly, as `ORG` does.
    pub fn set_pc(&mut self, pc: u32) {
        self.state_mut(self.current).pc = pc;
    }

    /// Writes one byte to the current section (if `pass` is
    /// [`Pass::Two`]; BSS never stores bytes) and advances its PC.
    pub fn emit_byte(&mut self, pass: Pass, byte: u8) {
        let section = self.current;
        let state = self.state_mut(section);
        state.pc += 1;
        if pass == Pass::Two && section != Section::Bss {
            state.bytes.push(byte);
        }
    }

    /// Writes a 24-bit little-endian value as three bytes.
    pub fn emit_long(&mut self, pass: Pass, value: u32) {
        self.emit_byte(pass, (value & 0xFF) as u8);
        self.emit_byte(pass, ((value >> 8) & 0xFF) as u8);
        self.emit_byte(pass, ((value >> 16) & 0xFF) as u8);
    }

    /// Writes a 16-bit little-endian value as two bytes.
    pub fn emit_word(&mut self, pass: Pass, value: u32) {
        self.emit_byte(pass, (value & 0xFF) as u8);
        self.emit_byte(pass, ((value >> 8) & 0xFF) as u8);
    }

    /// Reserves `count` bytes in the current section without writing any
    /// particular content to them in BSS; in CODE/DATA during pass 2 they
    /// are filled with `fill`.
    pub fn reserve(&mut self, pass: Pass, count: u32, fill: u8) {
        for _ in 0..count {
            self.emit_byte(pass, fill);
        }
    }

    /// Records a relocation at the current section's current byte offset.
    /// Must be called immediately before writing the first byte of the
    /// relocatable slot.
    pub fn emit_reloc(&mut self, kind: RelocationType, target: RelocationTarget, external_name: Option<String>) {
        self.relocations.push(Relocation {
            offset: self.pc(),
            section: self.current,
            kind,
            target,
            external_name,
        });
    }

    /// Emits a 24-bit little-endian value, recording an `ADDR24` relocation
    /// first if `value` carries a symbolic term. Used by every directive and
    /// instruction that can hold a relocatable address.
    pub fn emit_addr24(&mut self, file: &std::path::Path, line: u32, pass: Pass, value: &Value) -> Result<(), Error> {
        if let Some((name, term)) = &value.symbol {
            if value.negated {
                return Err(Error::InvalidOperands(at(
                    file,
                    line,
                    format!("`{name}` cannot be negated in a relocatable operand"),
                )));
            }

            if pass == Pass::Two {
                let target = match term {
                    SymbolicTerm::External => RelocationTarget::External,
                    SymbolicTerm::Local(Section::Code) => RelocationTarget::Code,
                    SymbolicTerm::Local(Section::Data) => RelocationTarget::Data,
                    SymbolicTerm::Local(Section::Bss) => RelocationTarget::Bss,
                    SymbolicTerm::Local(Section::Abs) => {
                        unreachable!("absolute symbols never carry a symbolic term")
                    }
                };
                let external_name = matches!(term, SymbolicTerm::External).then(|| name.clone());
                self.emit_reloc(RelocationType::Addr24, target, external_name);
            }
        }

        self.emit_long(pass, value.value);
        Ok(())
    }

    /// Size, in bytes, of the CODE section as assembled so far.
    pub fn code_size(&self) -> u32 {
        self.code.pc
    }

    /// Size, in bytes, of the DATA section as assembled so far.
    pub fn data_size(&self) -> u32 {
        self.data.pc
    }

    /// Size, in bytes, of the BSS section as assembled so far.
    pub fn bss_size(&self) -> u32 {
        self.bss.pc
    }

    /// The CODE section's byte stream (only meaningful after pass 2).
    pub fn code_bytes(&self) -> &[u8] {
        &self.code.bytes
    }

    /// The DATA section's byte stream (only meaningful after pass 2).
    pub fn data_bytes(&self) -> &[u8] {
        &self.data.bytes
    }

    /// Every relocation recorded so far.
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pc_advances_and_section_switch_restores() {
        let mut sections = Sections::new();
        sections.emit_byte(Pass::Two, 0);
        sections.emit_byte(Pass::Two, 0);
        assert_eq!(sections.pc(), 2);

        sections.switch_to(Section::Data);
        assert_eq!(sections.pc(), 0);
        sections.emit_byte(Pass::Two, 0);
        assert_eq!(sections.pc(), 1);

        sections.switch_to(Section::Code);
        assert_eq!(sections.pc(), 2, "CODE's PC was preserved across the switch");
    }

    #[test]
    fn test_bss_advances_pc_without_storing_bytes() {
        let mut sections = Sections::new();
        sections.switch_to(Section::Bss);
        sections.reserve(Pass::Two, 10, 0);

        assert_eq!(sections.bss_size(), 10);
        assert!(sections.code_bytes().is_empty());
    }

    #[test]
    fn test_pass_one_advances_pc_without_storing_bytes() {
        let mut sections = Sections::new();
        sections.emit_long(Pass::One, 0x123456);

        assert_eq!(sections.code_size(), 3);
        assert!(sections.code_bytes().is_empty());
    }
}
