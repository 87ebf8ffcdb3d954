// Error kinds for both halves of the toolchain

use std::fmt;

/// Errors raised while translating source text into bytecode.
///
/// Every variant is terminal for the current assembly run; there is no
/// partial-output recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmError {
    /// Line did not split into `mnemonic [arguments]`
    BadCommandFormat(usize, String), // line number, offending text
    /// `[` without `]` or vice versa around an operand group
    UnbalancedBrackets(usize),
    UnknownMnemonic(usize, String),
    UnknownRegister(usize, String),
    /// Operand is neither a register token nor a numeric literal
    BadOperand(usize, String),
    /// Sub-operands may only be chained with `+` or `-`
    BadSeparator(usize, char),
    /// No-operand instruction followed by argument text, or operand text
    /// missing where the catalog requires it
    ArityMismatch(usize, String, usize), // line, mnemonic, expected argc
    BadLabelName(usize, String),
    DuplicateLabel(usize, String),
    /// A label was referenced but never declared anywhere in the unit
    UnresolvedLabel(String),
    Io(String),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsmError::BadCommandFormat(line, text) => {
                write!(f, "line {}: malformed command '{}'", line, text)
            }
            AsmError::UnbalancedBrackets(line) => {
                write!(f, "line {}: unbalanced memory brackets", line)
            }
            AsmError::UnknownMnemonic(line, mnemonic) => {
                write!(f, "line {}: unknown mnemonic '{}'", line, mnemonic)
            }
            AsmError::UnknownRegister(line, register) => {
                write!(f, "line {}: unknown register '{}'", line, register)
            }
            AsmError::BadOperand(line, text) => {
                write!(f, "line {}: malformed operand '{}'", line, text)
            }
            AsmError::BadSeparator(line, found) => {
                write!(
                    f,
                    "line {}: expected '+' or '-' between operands, found '{}'",
                    line, found
                )
            }
            AsmError::ArityMismatch(line, mnemonic, argc) => {
                write!(f, "line {}: '{}' takes {} argument(s)", line, mnemonic, argc)
            }
            AsmError::BadLabelName(line, name) => {
                write!(f, "line {}: malformed label '{}'", line, name)
            }
            AsmError::DuplicateLabel(line, name) => {
                write!(f, "line {}: label '{}' already declared", line, name)
            }
            AsmError::UnresolvedLabel(name) => {
                write!(f, "label '{}' referenced but never declared", name)
            }
            AsmError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for AsmError {}

impl From<std::io::Error> for AsmError {
    fn from(e: std::io::Error) -> Self {
        AsmError::Io(e.to_string())
    }
}

/// Self-verification failures of the execution stack.
///
/// `Underflow` is an ordinary runtime error; the remaining variants mean the
/// stack's own invariants no longer hold, i.e. memory safety was violated
/// upstream of the check that caught it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    Underflow,
    LeftSentinel,
    RightSentinel,
    Checksum,
    SizeOutOfRange,
}

impl StackError {
    /// Corruption variants indicate the buffer itself is damaged, not merely
    /// a misuse of the API.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, StackError::Underflow)
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StackError::Underflow => write!(f, "stack underflow"),
            StackError::LeftSentinel => {
                write!(f, "stack corruption: left sentinel damaged")
            }
            StackError::RightSentinel => {
                write!(f, "stack corruption: right sentinel damaged")
            }
            StackError::Checksum => {
                write!(f, "stack corruption: checksum mismatch")
            }
            StackError::SizeOutOfRange => {
                write!(f, "stack corruption: size exceeds capacity")
            }
        }
    }
}

impl std::error::Error for StackError {}

/// Errors raised while executing a bytecode stream. All terminal for the run.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    UnknownOpcode(u8, usize), // opcode byte, offset
    /// Fetch ran past the end of the program mid-instruction
    UnexpectedEndOfProgram(usize),
    BadOperandTag(u8, usize), // tag byte, offset
    BadRegisterIndex(u8, usize), // payload byte, offset
    NonIntegralRamIndex(f64),
    RamIndexOutOfRange(i64, usize), // index, RAM cells
    StoreIntoImmediate(usize),
    BadInput(String),
    StepLimitExceeded(u64),
    Stack(StackError),
    Io(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeError::UnknownOpcode(opcode, offset) => {
                write!(f, "unknown opcode 0x{:02x} at offset {}", opcode, offset)
            }
            RuntimeError::UnexpectedEndOfProgram(offset) => {
                write!(f, "bytecode ends mid-instruction at offset {}", offset)
            }
            RuntimeError::BadOperandTag(tag, offset) => {
                write!(f, "malformed operand tag 0x{:02x} at offset {}", tag, offset)
            }
            RuntimeError::BadRegisterIndex(index, offset) => {
                write!(f, "register index {} at offset {} has no register", index, offset)
            }
            RuntimeError::NonIntegralRamIndex(value) => {
                write!(f, "RAM index {} is not a non-negative integer", value)
            }
            RuntimeError::RamIndexOutOfRange(index, cells) => {
                write!(f, "RAM index {} outside 0..{}", index, cells)
            }
            RuntimeError::StoreIntoImmediate(offset) => {
                write!(f, "cannot store into an immediate at offset {}", offset)
            }
            RuntimeError::BadInput(msg) => write!(f, "bad input: {}", msg),
            RuntimeError::StepLimitExceeded(limit) => {
                write!(f, "execution exceeded the {}-instruction limit", limit)
            }
            RuntimeError::Stack(e) => write!(f, "{}", e),
            RuntimeError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<StackError> for RuntimeError {
    fn from(e: StackError) -> Self {
        RuntimeError::Stack(e)
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::Io(e.to_string())
    }
}
