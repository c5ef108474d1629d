// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Two-pass assembler from CASM mnemonic text to binary bytecode.
//!
//! Pass 1 scans the instruction stream only to measure encoded sizes and to
//! hoist every `LBL(Lid)` label-here pseudo to the front of the text as a
//! full `LBL(Lid,#offset)` instruction, where the offset is the byte position
//! the pseudo marked. Pass 2 reparses the rewritten text from scratch into
//! the authoritative instruction list, which is then encoded behind the
//! fixed 16-byte header.

use std::fmt;

use crate::bytecode;
use crate::instructions::{self, ArgKind, Argument, Instruction, InstructionDef};
use crate::relation::Relation;
use crate::scheduler::CancelToken;

/// Category of an assembly failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    /// Unexpected character or end of input.
    Lexical,
    /// Grammar violation, wrong token, missing delimiter.
    Syntax,
    /// Unknown mnemonic or relation name.
    Semantic,
    /// Argument kind mismatch, too few or too many arguments.
    Argument,
    /// Value outside the declared byte/short range.
    Encoding,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AssembleError {
    kind: AsmErrorKind,
    message: String,
}

impl AssembleError {
    fn new(kind: AsmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(AsmErrorKind::Cancelled, "Assembly cancelled")
    }

    #[must_use]
    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == AsmErrorKind::Cancelled
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AssembleError {}

/// Assemble CASM text into bytecode.
pub fn assemble(casm: &str) -> Result<Vec<u8>, AssembleError> {
    assemble_with_cancel(casm, &CancelToken::new())
}

/// Assemble with a cancellation token, checked before each instruction.
pub fn assemble_with_cancel(
    casm: &str,
    cancel: &CancelToken,
) -> Result<Vec<u8>, AssembleError> {
    Assembler::new(casm, cancel).run()
}

struct Assembler<'a> {
    chars: Vec<char>,
    index: usize,
    c: char,
    cancel: &'a CancelToken,
}

impl<'a> Assembler<'a> {
    fn new(casm: &str, cancel: &'a CancelToken) -> Self {
        let chars: Vec<char> = prepare(casm).chars().collect();
        let c = chars[0];
        Self {
            chars,
            index: 0,
            c,
            cancel,
        }
    }

    fn run(&mut self) -> Result<Vec<u8>, AssembleError> {
        // Pass 1: hoist label-here pseudos to the front. `emitted` tracks
        // every instruction in program order, synthesized loads included, so
        // the recorded offsets match the final encoded stream.
        let mut top_lbls = String::new();
        let mut emitted: Vec<Instruction> = Vec::new();
        while self.index + 1 < self.chars.len() {
            if self.cancel.is_cancelled() {
                return Err(AssembleError::cancelled());
            }
            let start = self.index;
            let inst = self.instruction(&mut emitted)?;
            let inst_len = self.index - start;
            emitted.push(inst.clone());
            if inst.is_label_here() {
                let offset = stream_size(&emitted);
                top_lbls.push_str(&format!("LBL(L{},#{offset})", inst.args[0].value));
                // cut the pseudo out of the text and continue after it
                self.chars.drain(start..start + inst_len);
                self.index = start;
                if self.index < self.chars.len() {
                    self.c = self.chars[self.index];
                }
            }
        }

        let rest: String = self.chars.iter().collect();
        self.chars = format!("{top_lbls}{rest}").chars().collect();
        self.index = 0;
        self.c = self.chars[0];

        // Pass 2: the authoritative parse.
        let mut parsed: Vec<Instruction> = Vec::new();
        while self.c != '.' && self.index < self.chars.len() {
            if self.cancel.is_cancelled() {
                return Err(AssembleError::cancelled());
            }
            let inst = self.instruction(&mut parsed)?;
            parsed.push(inst);
        }

        let mut out = bytecode::header();
        for inst in &parsed {
            inst.encode_into(&mut out);
        }
        Ok(out)
    }

    /// Parse one instruction, appending any synthesized scratch-register
    /// loads to `emitted` before the instruction they feed.
    fn instruction(
        &mut self,
        emitted: &mut Vec<Instruction>,
    ) -> Result<Instruction, AssembleError> {
        let name = self.get_name()?;
        if name.is_empty() {
            return Err(AssembleError::new(
                AsmErrorKind::Syntax,
                "Expected instruction name.",
            ));
        }
        let def = instructions::by_mnemonic(&name).ok_or_else(|| {
            AssembleError::new(
                AsmErrorKind::Semantic,
                format!("Unknown instruction: {name}."),
            )
        })?;

        self.match_char('(')?;

        let mut args: Vec<Argument> = Vec::new();
        let mut args_found = 0usize;
        // Scratch registers for immediates in register slots are numbered
        // from 1 and reset per instruction. Collisions with registers already
        // live in the surrounding expression are not detected.
        let mut scratch_reg: u16 = 1;

        while self.c != ')' {
            if args_found >= def.arity() {
                return Err(AssembleError::new(
                    AsmErrorKind::Argument,
                    format!(
                        "Too many arguments found for instruction {}.",
                        def.full_name()
                    ),
                ));
            }
            let slot = def.slots[args_found];
            let kind = ArgKind::from_slot_name(slot);

            if kind == ArgKind::RelationCode && self.c != '#' {
                let mut rel_name = String::new();
                while self.c.is_ascii_uppercase() || self.c == '_' {
                    rel_name.push(self.c);
                    self.get_char()?;
                }
                let rel = Relation::from_keyword(&rel_name).ok_or_else(|| {
                    AssembleError::new(
                        AsmErrorKind::Semantic,
                        format!("Unknown relation name {rel_name}."),
                    )
                })?;
                args.push(Argument::new(slot, u16::from(rel.id())));
            } else {
                match self.c {
                    'C' => {
                        self.match_char('C')?;
                        self.match_char('(')?;
                        let r = self.get_byte()?;
                        self.match_char(',')?;
                        let g = self.get_byte()?;
                        self.match_char(',')?;
                        let b = self.get_byte()?;
                        self.match_char(')')?;
                        let packed = pack_color(r, g, b);
                        match kind {
                            ArgKind::Color => {
                                emitted.push(Instruction::load_immediate(
                                    scratch_reg,
                                    u16::from(packed),
                                ));
                                args.push(Argument::new(slot, scratch_reg));
                                scratch_reg += 1;
                            }
                            ArgKind::ByteImm | ArgKind::ShortImm => {
                                args.push(Argument::new(slot, u16::from(packed)));
                            }
                            _ => return Err(self.arg_mismatch(def, slot, "color")),
                        }
                    }
                    '#' => {
                        self.match_char('#')?;
                        if kind.is_immediate() {
                            let value = if kind == ArgKind::ShortImm {
                                self.get_short()?
                            } else {
                                u16::from(self.get_byte()?)
                            };
                            args.push(Argument::new(slot, value));
                        } else {
                            let value = self.get_byte()?;
                            emitted.push(Instruction::load_immediate(
                                scratch_reg,
                                u16::from(value),
                            ));
                            args.push(Argument::new(slot, scratch_reg));
                            scratch_reg += 1;
                        }
                    }
                    'S' => {
                        if !slot.starts_with('r') {
                            return Err(self.arg_mismatch(def, slot, "pop stack"));
                        }
                        self.match_char('S')?;
                        self.match_char('P')?;
                        self.match_char('+')?;
                        args.push(Argument::new(slot, instructions::STACK_POP_REGISTER));
                    }
                    'R' => {
                        self.match_char('R')?;
                        if !slot.starts_with('r') {
                            return Err(self.arg_mismatch(def, slot, "register"));
                        }
                        if !matches!(self.c, '0'..='7') {
                            return Err(AssembleError::new(
                                AsmErrorKind::Encoding,
                                format!("Invalid register ID {}.", self.c),
                            ));
                        }
                        args.push(Argument::new(slot, self.c as u16 - '0' as u16));
                        self.get_char()?;
                    }
                    'L' => {
                        self.match_char('L')?;
                        if !slot.starts_with('l') {
                            return Err(self.arg_mismatch(def, slot, "label"));
                        }
                        args.push(Argument::new(slot, u16::from(self.get_byte()?)));
                    }
                    'V' => {
                        self.match_char('V')?;
                        if !slot.starts_with('v') {
                            return Err(self.arg_mismatch(def, slot, "variable"));
                        }
                        args.push(Argument::new(slot, u16::from(self.get_byte()?)));
                    }
                    other => {
                        return Err(AssembleError::new(
                            AsmErrorKind::Lexical,
                            format!(
                                "Encountered unknown argument type {other} while parsing {}.",
                                def.full_name()
                            ),
                        ))
                    }
                }
            }

            args_found += 1;
            if self.c == ')' {
                break;
            }
            self.match_char(',')?;
        }

        self.match_char(')')?;

        // Single-argument LBL is the label-here shortcut; it becomes the
        // pseudo-opcode and is rewritten by pass 1.
        if def.mnemonic == "LBL" && args.len() == 1 {
            return Ok(Instruction::label_here(args[0].value));
        }

        if args_found < def.arity() {
            let needed = def.arity() - args_found;
            let plural = if needed == 1 { "" } else { "s" };
            return Err(AssembleError::new(
                AsmErrorKind::Argument,
                format!(
                    "Instruction {} is missing {needed} argument{plural}.",
                    def.full_name()
                ),
            ));
        }

        Ok(Instruction::from_def(def, args))
    }

    fn arg_mismatch(
        &self,
        def: &'static InstructionDef,
        slot: &str,
        found: &str,
    ) -> AssembleError {
        AssembleError::new(
            AsmErrorKind::Argument,
            format!(
                "Expected argument of type {slot} but found a {found} argument. \
                 In instruction {}!",
                def.full_name()
            ),
        )
    }

    // ---- character stream ----

    fn get_char(&mut self) -> Result<(), AssembleError> {
        self.index += 1;
        if self.index >= self.chars.len() {
            return Err(AssembleError::new(
                AsmErrorKind::Lexical,
                "Reached end of code unexpectedly!",
            ));
        }
        self.c = self.chars[self.index];
        Ok(())
    }

    fn match_char(&mut self, m: char) -> Result<(), AssembleError> {
        if self.c != m {
            return Err(AssembleError::new(
                AsmErrorKind::Syntax,
                format!("Expected '{m}'"),
            ));
        }
        self.get_char()
    }

    fn get_name(&mut self) -> Result<String, AssembleError> {
        let mut name = String::new();
        while self.c.is_ascii_uppercase() {
            name.push(self.c);
            self.get_char()?;
        }
        Ok(name)
    }

    fn get_digits(&mut self) -> Result<String, AssembleError> {
        let mut num = String::new();
        while self.c.is_ascii_digit() {
            num.push(self.c);
            self.get_char()?;
        }
        Ok(num)
    }

    fn get_byte(&mut self) -> Result<u8, AssembleError> {
        let num = self.get_digits()?;
        if num.is_empty() {
            return Err(AssembleError::new(AsmErrorKind::Syntax, "Expected byte."));
        }
        let value = num.parse::<u32>().unwrap_or(u32::MAX);
        if value > 255 {
            return Err(AssembleError::new(
                AsmErrorKind::Encoding,
                "Expected byte value within 0 and 255.",
            ));
        }
        Ok(value as u8)
    }

    fn get_short(&mut self) -> Result<u16, AssembleError> {
        let num = self.get_digits()?;
        if num.is_empty() {
            return Err(AssembleError::new(AsmErrorKind::Syntax, "Expected short."));
        }
        let value = num.parse::<u32>().unwrap_or(u32::MAX);
        if value > 65535 {
            return Err(AssembleError::new(
                AsmErrorKind::Encoding,
                "Expected short value within 0 and 65,535.",
            ));
        }
        Ok(value as u16)
    }
}

/// Total encoded size of the instructions seen so far, label-here pseudos
/// counting as the real LBL they become.
fn stream_size(instructions: &[Instruction]) -> usize {
    instructions.iter().map(Instruction::encoded_size).sum()
}

/// Pack an 8-bit-per-channel color into one RRRGGGBB byte.
fn pack_color(r: u8, g: u8, b: u8) -> u8 {
    let r = (f32::from(r) / 36.428) as u8;
    let g = (f32::from(g) / 36.428) as u8;
    let b = b / 64;
    (r << 5) | (g << 2) | b
}

/// Strip spaces and `//` comments, join lines, upper-case, and append the
/// termination sentinel.
fn prepare(casm: &str) -> String {
    let no_spaces = casm.replace(' ', "");
    let mut text = String::new();
    for line in no_spaces.split('\n') {
        let line = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        text.push_str(line.trim());
    }
    let mut text = text.to_uppercase();
    text.push('.');
    text
}
