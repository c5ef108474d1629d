// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Bytecode container format and the instruction-stream decoder.
//!
//! A program file is a four byte magic number, twelve reserved padding bytes,
//! then the instruction stream. The stream ends at the first `NOP` opcode or,
//! failing that, at the end of the buffer.

use std::fmt;

use crate::instructions::{self, Argument, Instruction};

pub const MAGIC: [u8; 4] = [0xDA, 0xBB, 0xED, 0xAF];
pub const PADDING_BYTE: u8 = 0xAB;
pub const PADDING_LEN: usize = 12;
pub const HEADER_LEN: usize = MAGIC.len() + PADDING_LEN;

/// The fixed file header every assembled program starts with.
#[must_use]
pub fn header() -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(&MAGIC);
    out.resize(HEADER_LEN, PADDING_BYTE);
    out
}

#[derive(Debug, Clone)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    fn new(message: String) -> Self {
        Self { message }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DecodeError {}

/// Decode a complete program file, header included.
pub fn decode_program(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
        return Err(DecodeError::new(
            "Not a bytecode program: bad magic number.".to_string(),
        ));
    }
    decode_stream(&bytes[HEADER_LEN..])
}

/// Decode a raw instruction stream. A `NOP` opcode terminates the stream;
/// running off the end of the buffer terminates it implicitly. An opcode the
/// catalog does not know is fatal.
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        if opcode == 0x00 {
            break;
        }
        let def = instructions::by_opcode(opcode).ok_or_else(|| {
            DecodeError::new(format!(
                "Unknown instruction 0x{opcode:02X} at offset {offset}."
            ))
        })?;
        let mut cursor = offset + 1;
        let mut args = Vec::with_capacity(def.arity());
        for &slot in def.slots {
            let width = if slot.starts_with('s') { 2 } else { 1 };
            if cursor + width > code.len() {
                return Err(DecodeError::new(format!(
                    "Truncated {} instruction at offset {offset}.",
                    def.mnemonic
                )));
            }
            let value = if width == 2 {
                (u16::from(code[cursor]) << 8) | u16::from(code[cursor + 1])
            } else {
                u16::from(code[cursor])
            };
            args.push(Argument::new(slot, value));
            cursor += width;
        }
        out.push(Instruction::from_def(def, args));
        offset = cursor;
    }
    Ok(out)
}

/// Render a program file as a human-readable listing: stream offset, raw
/// bytes, and the CASM text of each instruction.
pub fn listing(bytes: &[u8]) -> Result<String, DecodeError> {
    let decoded = decode_program(bytes)?;
    let mut out = String::new();
    let mut offset = 0usize;
    for inst in &decoded {
        let size = inst.encoded_size();
        let mut raw = Vec::with_capacity(size);
        inst.encode_into(&mut raw);
        let hex: Vec<String> = raw.iter().map(|b| format!("{b:02X}")).collect();
        out.push_str(&format!(
            "{offset:04X}  {:<16} {}\n",
            hex.join(" "),
            inst.to_code()
        ));
        offset += size;
    }
    Ok(out)
}
