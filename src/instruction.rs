//! Bit-level vocabulary of the instruction encoding.
//!
//! Wire layout of one instruction record:
//!
//! - control transfer: `[opcode:1][absolute_offset:4 LE]`
//! - zero-operand:     `[opcode:1]`
//! - with operands:    `[opcode:1][metadata:1][tag:1 + payload, per operand]`
//!
//! The metadata byte packs the operand count into bits 7..5 and the group
//! addressing mode into bits 4..2; bits 1..0 are unused. Each operand tag
//! byte carries the same 3-bit mode field in bits 2..0. A register payload is
//! one byte (letter offset from 'a'); an immediate payload is a raw IEEE-754
//! double, little-endian.

use crate::error::RuntimeError;

/// Memory bit of the 3-bit MRI field (meaningful at group level only)
pub const MODE_MEMORY: u8 = 0b100;
/// Register bit of the 3-bit MRI field
pub const MODE_REGISTER: u8 = 0b010;
/// Immediate bit of the 3-bit MRI field
pub const MODE_IMMEDIATE: u8 = 0b001;

/// Width of a control-transfer target on the wire
pub const OFFSET_WIDTH: usize = 4;
/// Width of an immediate operand on the wire
pub const IMMEDIATE_WIDTH: usize = 8;

/// Registers are `ax`..`dx`; the payload byte is the letter offset from 'a'.
pub const REGISTER_COUNT: usize = 4;
const FIRST_REGISTER_LETTER: char = 'a';
const LAST_REGISTER_LETTER: char = 'd';

/// Addressing mode of a single encoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandMode {
    Register,
    Immediate,
}

impl OperandMode {
    /// Parse an operand tag byte. Register and immediate are mutually
    /// exclusive at operand granularity; anything else is malformed.
    pub fn from_tag(tag: u8, offset: usize) -> Result<Self, RuntimeError> {
        if tag & MODE_REGISTER != 0 {
            Ok(OperandMode::Register)
        } else if tag & MODE_IMMEDIATE != 0 {
            Ok(OperandMode::Immediate)
        } else {
            Err(RuntimeError::BadOperandTag(tag, offset))
        }
    }

}

/// Pack the operand count and group addressing mode into a metadata byte.
pub fn pack_metadata(operand_count: usize, group_mode: u8) -> u8 {
    ((operand_count as u8) << 5) | (group_mode << 2)
}

/// Operand count field of a metadata byte (bits 7..5).
pub fn metadata_operand_count(metadata: u8) -> usize {
    ((metadata & 0b1110_0000) >> 5) as usize
}

/// Group addressing mode field of a metadata byte (bits 4..2).
pub fn metadata_group_mode(metadata: u8) -> u8 {
    (metadata & 0b0001_1100) >> 2
}

/// Whole operand group is dereferenced through RAM.
pub fn group_is_memory(group_mode: u8) -> bool {
    group_mode & MODE_MEMORY != 0
}

/// Translate a register token (`ax`..`dx`) into its wire index.
pub fn register_index(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    let letter = chars.next()?;
    if chars.next() != Some('x') || chars.next().is_some() {
        return None;
    }
    if !(FIRST_REGISTER_LETTER..=LAST_REGISTER_LETTER).contains(&letter) {
        return None;
    }
    Some(letter as u8 - FIRST_REGISTER_LETTER as u8)
}

/// Render a wire register index back into its token, for listings.
pub fn register_name(index: u8) -> String {
    format!("{}x", (FIRST_REGISTER_LETTER as u8 + index) as char)
}
