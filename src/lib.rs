//! stackmill: an assembler and virtual machine sharing one bit-packed
//! bytecode format.
//!
//! `smasm` translates line-oriented assembly into a compact instruction
//! stream; the `stackmill` binary executes it against a register file, a
//! linear f64 RAM and a self-verifying operand stack; `smdasm` prints a
//! listing. All three consult the same instruction catalog, so the encoder
//! and the decoder cannot disagree on an opcode's meaning.

pub mod assembler;
pub mod config;
pub mod disassembler;
pub mod error;
pub mod instruction;
pub mod interpreter;
pub mod labels;
pub mod machine;
pub mod opcode_tables;
pub mod stack;
