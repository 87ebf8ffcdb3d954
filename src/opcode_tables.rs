//! The instruction catalog shared by the assembler and the virtual machine.
//!
//! Both halves of the toolchain consult this one table: the assembler for
//! mnemonic validation and arity, the interpreter for opcode dispatch, the
//! disassembler for listings. Keeping it in one place guarantees the encoder
//! can never emit an opcode the decoder does not understand.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Every instruction the machine understands, tagged with its wire opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Push = 0,
    Pop = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Out = 6,
    In = 7,
    Jmp = 8,
    Call = 9,
    Ret = 10,
    Outc = 11,
    Sqrt = 12,
    Je = 13,
    Jl = 14,
    Cmp = 15,
    Jg = 16,
    Jne = 17,
    Halt = 255,
}

/// One catalog row: mnemonic, opcode, operand arity.
#[derive(Debug, Clone, Copy)]
pub struct InstructionDescriptor {
    pub mnemonic: &'static str,
    pub opcode: Opcode,
    pub operand_count: usize,
}

/// The catalog itself. Opcode values are unique; arity is fixed per opcode.
#[rustfmt::skip]
pub const CATALOG: &[InstructionDescriptor] = &[
    InstructionDescriptor { mnemonic: "push", opcode: Opcode::Push, operand_count: 1 },
    InstructionDescriptor { mnemonic: "pop",  opcode: Opcode::Pop,  operand_count: 1 },
    InstructionDescriptor { mnemonic: "add",  opcode: Opcode::Add,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "sub",  opcode: Opcode::Sub,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "mul",  opcode: Opcode::Mul,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "div",  opcode: Opcode::Div,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "out",  opcode: Opcode::Out,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "in",   opcode: Opcode::In,   operand_count: 0 },
    InstructionDescriptor { mnemonic: "jmp",  opcode: Opcode::Jmp,  operand_count: 1 },
    InstructionDescriptor { mnemonic: "call", opcode: Opcode::Call, operand_count: 1 },
    InstructionDescriptor { mnemonic: "ret",  opcode: Opcode::Ret,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "outc", opcode: Opcode::Outc, operand_count: 0 },
    InstructionDescriptor { mnemonic: "sqrt", opcode: Opcode::Sqrt, operand_count: 0 },
    InstructionDescriptor { mnemonic: "je",   opcode: Opcode::Je,   operand_count: 1 },
    InstructionDescriptor { mnemonic: "jl",   opcode: Opcode::Jl,   operand_count: 1 },
    InstructionDescriptor { mnemonic: "cmp",  opcode: Opcode::Cmp,  operand_count: 0 },
    InstructionDescriptor { mnemonic: "jg",   opcode: Opcode::Jg,   operand_count: 1 },
    InstructionDescriptor { mnemonic: "jne",  opcode: Opcode::Jne,  operand_count: 1 },
    InstructionDescriptor { mnemonic: "halt", opcode: Opcode::Halt, operand_count: 0 },
];

lazy_static! {
    static ref BY_MNEMONIC: HashMap<&'static str, &'static InstructionDescriptor> =
        CATALOG.iter().map(|d| (d.mnemonic, d)).collect();
}

/// Look up a descriptor by mnemonic, or None for an unknown mnemonic.
pub fn by_mnemonic(mnemonic: &str) -> Option<&'static InstructionDescriptor> {
    BY_MNEMONIC.get(mnemonic).copied()
}

impl Opcode {
    /// Decode an opcode byte, or None for an unknown opcode.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            0 => Some(Opcode::Push),
            1 => Some(Opcode::Pop),
            2 => Some(Opcode::Add),
            3 => Some(Opcode::Sub),
            4 => Some(Opcode::Mul),
            5 => Some(Opcode::Div),
            6 => Some(Opcode::Out),
            7 => Some(Opcode::In),
            8 => Some(Opcode::Jmp),
            9 => Some(Opcode::Call),
            10 => Some(Opcode::Ret),
            11 => Some(Opcode::Outc),
            12 => Some(Opcode::Sqrt),
            13 => Some(Opcode::Je),
            14 => Some(Opcode::Jl),
            15 => Some(Opcode::Cmp),
            16 => Some(Opcode::Jg),
            17 => Some(Opcode::Jne),
            255 => Some(Opcode::Halt),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable instruction name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Out => "out",
            Opcode::In => "in",
            Opcode::Jmp => "jmp",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Outc => "outc",
            Opcode::Sqrt => "sqrt",
            Opcode::Je => "je",
            Opcode::Jl => "jl",
            Opcode::Cmp => "cmp",
            Opcode::Jg => "jg",
            Opcode::Jne => "jne",
            Opcode::Halt => "halt",
        }
    }

    pub fn operand_count(self) -> usize {
        // The catalog is the source of truth for arity; every variant has a row.
        CATALOG
            .iter()
            .find(|d| d.opcode == self)
            .map(|d| d.operand_count)
            .unwrap_or(0)
    }

    /// Control-transfer ("special") instructions take a single label operand
    /// and encode it as a 4-byte absolute offset.
    pub fn is_control_transfer(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Call | Opcode::Je | Opcode::Jne | Opcode::Jl | Opcode::Jg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values_are_unique() {
        for (i, a) in CATALOG.iter().enumerate() {
            for b in &CATALOG[i + 1..] {
                assert_ne!(a.opcode.as_byte(), b.opcode.as_byte());
                assert_ne!(a.mnemonic, b.mnemonic);
            }
        }
    }

    #[test]
    fn test_byte_round_trip() {
        for d in CATALOG {
            assert_eq!(Opcode::from_byte(d.opcode.as_byte()), Some(d.opcode));
        }
        assert_eq!(Opcode::from_byte(200), None);
    }

    #[test]
    fn test_lookup_by_mnemonic() {
        let push = by_mnemonic("push").unwrap();
        assert_eq!(push.opcode, Opcode::Push);
        assert_eq!(push.operand_count, 1);
        assert!(by_mnemonic("foo").is_none());
    }

    #[test]
    fn test_control_transfer_set() {
        for d in CATALOG {
            let special = matches!(d.mnemonic, "jmp" | "call" | "je" | "jne" | "jl" | "jg");
            assert_eq!(d.opcode.is_control_transfer(), special, "{}", d.mnemonic);
        }
    }
}
