//! Bytecode listing.
//!
//! Walks an encoded program with the same catalog and bit vocabulary the
//! interpreter uses and renders one line per instruction: offset, mnemonic,
//! operands. Control-transfer targets print as raw absolute offsets since
//! label names do not survive assembly.

use crate::error::RuntimeError;
use crate::instruction::{
    group_is_memory, metadata_group_mode, metadata_operand_count, register_name, OperandMode,
    IMMEDIATE_WIDTH, OFFSET_WIDTH,
};
use crate::opcode_tables::Opcode;
use std::fmt::Write;

/// Render a full program as a textual listing.
pub fn disassemble(program: &[u8]) -> Result<String, RuntimeError> {
    let mut listing = String::new();
    let mut at = 0;

    while at < program.len() {
        let (text, size) = disassemble_one(program, at)?;
        writeln!(listing, "{:06}: {}", at, text).expect("string write cannot fail");
        at += size;
    }

    Ok(listing)
}

/// Decode one instruction record; returns its text and byte length.
fn disassemble_one(program: &[u8], at: usize) -> Result<(String, usize), RuntimeError> {
    let opcode_byte = program[at];
    let opcode =
        Opcode::from_byte(opcode_byte).ok_or(RuntimeError::UnknownOpcode(opcode_byte, at))?;
    let mut text = opcode.mnemonic().to_string();
    let mut offset = at + 1;

    if opcode.is_control_transfer() {
        let bytes = program
            .get(offset..offset + OFFSET_WIDTH)
            .ok_or(RuntimeError::UnexpectedEndOfProgram(offset))?;
        let target = u32::from_le_bytes(bytes.try_into().expect("slice length checked"));
        write!(text, " {}", target).expect("string write cannot fail");
        return Ok((text, 1 + OFFSET_WIDTH));
    }

    if opcode.operand_count() == 0 {
        return Ok((text, 1));
    }

    let metadata = *program
        .get(offset)
        .ok_or(RuntimeError::UnexpectedEndOfProgram(offset))?;
    offset += 1;
    let count = metadata_operand_count(metadata);
    let memory = group_is_memory(metadata_group_mode(metadata));

    let mut rendered = Vec::with_capacity(count);
    for _ in 0..count {
        let tag_at = offset;
        let tag = *program
            .get(offset)
            .ok_or(RuntimeError::UnexpectedEndOfProgram(offset))?;
        offset += 1;
        match OperandMode::from_tag(tag, tag_at)? {
            OperandMode::Register => {
                let index = *program
                    .get(offset)
                    .ok_or(RuntimeError::UnexpectedEndOfProgram(offset))?;
                offset += 1;
                rendered.push(register_name(index));
            }
            OperandMode::Immediate => {
                let bytes = program
                    .get(offset..offset + IMMEDIATE_WIDTH)
                    .ok_or(RuntimeError::UnexpectedEndOfProgram(offset))?;
                offset += IMMEDIATE_WIDTH;
                let value = f64::from_le_bytes(bytes.try_into().expect("slice length checked"));
                rendered.push(format!("{}", value));
            }
        }
    }

    let operands = rendered.join("+");
    if memory {
        write!(text, " [{}]", operands).expect("string write cannot fail");
    } else {
        write!(text, " {}", operands).expect("string write cannot fail");
    }

    Ok((text, offset - at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    #[test]
    fn test_listing_of_example_program() {
        let program = assemble("push 5\npush 3\nadd\noutc\nhalt\n").unwrap();
        let listing = disassemble(&program).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "000000: push 5");
        assert_eq!(lines[1], "000011: push 3");
        assert_eq!(lines[2], "000022: add");
        assert_eq!(lines[3], "000023: outc");
        assert_eq!(lines[4], "000024: halt");
    }

    #[test]
    fn test_control_transfer_shows_absolute_target() {
        let program = assemble("jmp end\nend:\nhalt\n").unwrap();
        let listing = disassemble(&program).unwrap();
        assert!(listing.starts_with("000000: jmp 5"));
    }

    #[test]
    fn test_memory_group_brackets() {
        let program = assemble("pop [ax+1]\n").unwrap();
        let listing = disassemble(&program).unwrap();
        assert_eq!(listing.trim_end(), "000000: pop [ax+1]");
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert_eq!(
            disassemble(&[0x7f]),
            Err(RuntimeError::UnknownOpcode(0x7f, 0))
        );
    }
}
