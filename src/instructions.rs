// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction catalog and instruction instances.
//!
//! The catalog is the fixed table of opcodes the VM understands. Each entry
//! declares an ordered list of argument slots; a slot's kind is inferred from
//! its name prefix (`r` register, `#` byte immediate, `s` short immediate,
//! `l` label id, `v` variable id, `#CompType` relation code, `rCol`
//! color-capable register). The table is immutable and shared process-wide.

/// Kind of an argument slot, inferred from the slot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Register,
    ByteImm,
    ShortImm,
    Label,
    Variable,
    RelationCode,
    Color,
}

impl ArgKind {
    #[must_use]
    pub fn from_slot_name(name: &str) -> Self {
        if name == "#CompType" {
            return ArgKind::RelationCode;
        }
        if name == "rCol" {
            return ArgKind::Color;
        }
        match name.as_bytes().first() {
            Some(b'#') => ArgKind::ByteImm,
            Some(b's') => ArgKind::ShortImm,
            Some(b'l') => ArgKind::Label,
            Some(b'v') => ArgKind::Variable,
            _ => ArgKind::Register,
        }
    }

    /// Slots of this kind accept a literal value directly instead of forcing
    /// a scratch-register load.
    #[must_use]
    pub fn is_immediate(self) -> bool {
        matches!(
            self,
            ArgKind::ByteImm | ArgKind::ShortImm | ArgKind::RelationCode
        )
    }
}

/// One entry of the instruction catalog.
#[derive(Debug, Clone, Copy)]
pub struct InstructionDef {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub slots: &'static [&'static str],
}

impl InstructionDef {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Render as `MNEM(slot, slot, ...)` for error messages.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}({})", self.mnemonic, self.slots.join(", "))
    }
}

const fn def(
    opcode: u8,
    mnemonic: &'static str,
    slots: &'static [&'static str],
) -> InstructionDef {
    InstructionDef {
        opcode,
        mnemonic,
        slots,
    }
}

pub static INSTRUCTION_TABLE: &[InstructionDef] = &[
    def(0x00, "NOP", &[]),
    def(0x01, "ADD", &["r1", "r2", "rOut"]),
    def(0x02, "SUB", &["r1", "r2", "rOut"]),
    def(0x03, "MUL", &["r1", "r2", "rOut"]),
    def(0x04, "RGT", &["r1", "r2", "rOut"]),
    def(0x05, "LFT", &["r1", "r2", "rOut"]),
    def(0x06, "LBL", &["lId", "sAddress"]),
    def(0x07, "JMP", &["lId"]),
    def(0x08, "JIF", &["lId", "#CompType"]),
    def(0x09, "MOV", &["rTo", "#Val"]),
    def(0x0A, "PSH", &["rFrom"]),
    def(0x0B, "RTR", &["rFrom", "rTo"]),
    def(0x0C, "MTR", &["sFrom", "rTo"]),
    def(0x0D, "RTM", &["rFrom", "sTo"]),
    def(0x0E, "MTM", &["sFrom", "sTo"]),
    def(0x0F, "VTR", &["vFrom", "rTo"]),
    def(0x10, "RTV", &["rFrom", "vTo"]),
    def(0x11, "FTR", &["rTo"]),
    def(0x12, "CMP", &["r1", "r2"]),
    def(0x13, "AND", &["r1", "r2", "rOut"]),
    def(0x14, "NOT", &["rIn", "rOut"]),
    def(0x15, "OR", &["r1", "r2", "rOut"]),
    def(0x16, "XOR", &["r1", "r2", "rOut"]),
    def(0x50, "PXL", &["rX", "rY", "rCol"]),
    def(0x51, "LIN", &["rX", "rY", "rX1", "rY1", "rCol"]),
    def(0x52, "PRT", &["rX", "rY", "rChar"]),
    def(0x53, "GMT", &[]),
];

/// Pseudo-opcode for the single-argument `LBL(Lid)` "declare label here"
/// shortcut. Removed by the assembler's first pass, never encoded.
pub const LABEL_HERE_OPCODE: u8 = 0xFF;

pub static LABEL_HERE_DEF: InstructionDef = def(LABEL_HERE_OPCODE, "LBL", &["lId"]);

/// Byte size the first pass assumes for a label-here pseudo: the encoded size
/// of the real `LBL(lId, sAddress)` instruction it is rewritten into. The
/// `pseudo_label_size_matches_real_lbl` test pins this coupling.
pub const LABEL_HERE_SIZE: usize = 4;

/// Look up an instruction definition by mnemonic. Case-insensitive; the
/// two-argument `LBL` entry is returned (the pseudo form is not in the table).
#[must_use]
pub fn by_mnemonic(name: &str) -> Option<&'static InstructionDef> {
    INSTRUCTION_TABLE
        .iter()
        .find(|entry| entry.mnemonic.eq_ignore_ascii_case(name))
}

#[must_use]
pub fn by_opcode(opcode: u8) -> Option<&'static InstructionDef> {
    INSTRUCTION_TABLE.iter().find(|entry| entry.opcode == opcode)
}

/// Register id encoded for the `SP+` stack-pop pseudo-register.
pub const STACK_POP_REGISTER: u16 = 10;

/// A concrete argument: the slot it fills and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument {
    pub slot: &'static str,
    pub value: u16,
}

impl Argument {
    #[must_use]
    pub fn new(slot: &'static str, value: u16) -> Self {
        Self { slot, value }
    }

    #[must_use]
    pub fn is_short(&self) -> bool {
        self.slot.starts_with('s')
    }

    /// Render as CASM text: slot prefix plus decimal value (`r0`, `#5`, `l3`).
    #[must_use]
    pub fn to_code(&self) -> String {
        let prefix = self.slot.chars().next().unwrap_or('?');
        format!("{prefix}{}", self.value)
    }
}

/// An instruction instance: a catalog entry bound to concrete arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub args: Vec<Argument>,
}

impl Instruction {
    #[must_use]
    pub fn from_def(def: &'static InstructionDef, args: Vec<Argument>) -> Self {
        Self {
            opcode: def.opcode,
            mnemonic: def.mnemonic,
            args,
        }
    }

    /// The label-here pseudo, carrying only the label id.
    #[must_use]
    pub fn label_here(label_id: u16) -> Self {
        Self {
            opcode: LABEL_HERE_OPCODE,
            mnemonic: LABEL_HERE_DEF.mnemonic,
            args: vec![Argument::new(LABEL_HERE_DEF.slots[0], label_id)],
        }
    }

    /// Synthesized `MOV(rN, #val)` used to place an immediate into a scratch
    /// register when a register slot receives a literal.
    #[must_use]
    pub fn load_immediate(register: u16, value: u16) -> Self {
        let mov = by_opcode(0x09).expect("MOV in catalog");
        Self::from_def(
            mov,
            vec![
                Argument::new(mov.slots[0], register),
                Argument::new(mov.slots[1], value),
            ],
        )
    }

    #[must_use]
    pub fn is_label_here(&self) -> bool {
        self.opcode == LABEL_HERE_OPCODE
    }

    /// Encoded byte size: one opcode byte plus one byte per argument, two for
    /// short-typed slots. Label-here pseudos count as the real LBL they will
    /// be rewritten into.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        if self.is_label_here() {
            return LABEL_HERE_SIZE;
        }
        1 + self
            .args
            .iter()
            .map(|arg| if arg.is_short() { 2 } else { 1 })
            .sum::<usize>()
    }

    /// Append the binary encoding. Shorts are stored high byte first.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode);
        for arg in &self.args {
            if arg.is_short() {
                out.push((arg.value >> 8) as u8);
                out.push((arg.value & 0xFF) as u8);
            } else {
                out.push((arg.value & 0xFF) as u8);
            }
        }
    }

    /// Render as CASM text, e.g. `MOV(r0, #5)`.
    #[must_use]
    pub fn to_code(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Argument::to_code).collect();
        format!("{}({})", self.mnemonic, args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_mnemonic_is_case_insensitive() {
        assert_eq!(by_mnemonic("mov").map(|d| d.opcode), Some(0x09));
        assert_eq!(by_mnemonic("MOV").map(|d| d.opcode), Some(0x09));
        assert!(by_mnemonic("FOO").is_none());
    }

    #[test]
    fn lbl_lookup_returns_real_instruction() {
        let def = by_mnemonic("LBL").expect("LBL");
        assert_eq!(def.opcode, 0x06);
        assert_eq!(def.arity(), 2);
    }

    #[test]
    fn slot_kinds_follow_name_prefix() {
        assert_eq!(ArgKind::from_slot_name("rOut"), ArgKind::Register);
        assert_eq!(ArgKind::from_slot_name("#Val"), ArgKind::ByteImm);
        assert_eq!(ArgKind::from_slot_name("sAddress"), ArgKind::ShortImm);
        assert_eq!(ArgKind::from_slot_name("lId"), ArgKind::Label);
        assert_eq!(ArgKind::from_slot_name("vFrom"), ArgKind::Variable);
        assert_eq!(ArgKind::from_slot_name("#CompType"), ArgKind::RelationCode);
        assert_eq!(ArgKind::from_slot_name("rCol"), ArgKind::Color);
    }

    #[test]
    fn pseudo_label_size_matches_real_lbl() {
        let lbl = by_mnemonic("LBL").expect("LBL");
        let inst = Instruction::from_def(
            lbl,
            vec![Argument::new(lbl.slots[0], 0), Argument::new(lbl.slots[1], 0)],
        );
        assert_eq!(inst.encoded_size(), LABEL_HERE_SIZE);
        assert_eq!(Instruction::label_here(0).encoded_size(), LABEL_HERE_SIZE);
    }

    #[test]
    fn short_slots_encode_big_endian() {
        let lbl = by_mnemonic("LBL").expect("LBL");
        let inst = Instruction::from_def(
            lbl,
            vec![
                Argument::new(lbl.slots[0], 3),
                Argument::new(lbl.slots[1], 0x1234),
            ],
        );
        let mut out = Vec::new();
        inst.encode_into(&mut out);
        assert_eq!(out, vec![0x06, 0x03, 0x12, 0x34]);
    }

    #[test]
    fn renders_casm_text() {
        let inst = Instruction::load_immediate(1, 255);
        assert_eq!(inst.to_code(), "MOV(r1, #255)");
    }

    #[test]
    fn opcodes_are_unique() {
        for (i, a) in INSTRUCTION_TABLE.iter().enumerate() {
            for b in &INSTRUCTION_TABLE[i + 1..] {
                assert_ne!(a.opcode, b.opcode, "{} and {}", a.mnemonic, b.mnemonic);
            }
        }
    }
}
