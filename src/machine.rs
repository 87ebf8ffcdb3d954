//! CPU state: instruction pointer, register file, linear RAM and the
//! execution stack, plus the raw fetch helpers the interpreter builds on.
//! One `Machine` owns one program for one run; nothing is shared.

use crate::config::{MachineConfig, RAM_CELLS_TO_DUMP};
use crate::error::RuntimeError;
use crate::instruction::{register_name, IMMEDIATE_WIDTH, OFFSET_WIDTH, REGISTER_COUNT};
use crate::stack::GuardedStack;
use log::debug;

pub struct Machine {
    /// The bytecode being executed
    pub program: Vec<u8>,
    /// Byte offset of the next fetch
    pub ip: usize,
    pub registers: [f64; REGISTER_COUNT],
    pub ram: Vec<f64>,
    pub stack: GuardedStack,
    halted: bool,
}

impl Machine {
    pub fn new(program: Vec<u8>) -> Self {
        Self::with_config(program, &MachineConfig::default())
    }

    pub fn with_config(program: Vec<u8>, config: &MachineConfig) -> Self {
        Machine {
            program,
            ip: 0,
            registers: [0.0; REGISTER_COUNT],
            ram: vec![0.0; config.ram_cells],
            stack: GuardedStack::with_capacity(config.stack_capacity),
            halted: false,
        }
    }

    /// Running means the ip is still inside the stream and no halt was seen.
    pub fn is_running(&self) -> bool {
        !self.halted && self.ip < self.program.len()
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Fetch one byte at ip and advance.
    pub fn fetch_byte(&mut self) -> Result<u8, RuntimeError> {
        let byte = *self
            .program
            .get(self.ip)
            .ok_or(RuntimeError::UnexpectedEndOfProgram(self.ip))?;
        self.ip += 1;
        Ok(byte)
    }

    /// Fetch a little-endian IEEE-754 double at ip and advance.
    pub fn fetch_f64(&mut self) -> Result<f64, RuntimeError> {
        let end = self.ip + IMMEDIATE_WIDTH;
        let bytes = self
            .program
            .get(self.ip..end)
            .ok_or(RuntimeError::UnexpectedEndOfProgram(self.ip))?;
        let value = f64::from_le_bytes(bytes.try_into().expect("slice length checked"));
        self.ip = end;
        Ok(value)
    }

    /// Fetch a 4-byte little-endian absolute offset at ip and advance.
    pub fn fetch_offset(&mut self) -> Result<u32, RuntimeError> {
        let end = self.ip + OFFSET_WIDTH;
        let bytes = self
            .program
            .get(self.ip..end)
            .ok_or(RuntimeError::UnexpectedEndOfProgram(self.ip))?;
        let offset = u32::from_le_bytes(bytes.try_into().expect("slice length checked"));
        self.ip = end;
        Ok(offset)
    }

    /// Diagnostic dump: registers, ip with the next opcode byte, stack,
    /// leading RAM cells.
    pub fn dump(&self) {
        for (index, value) in self.registers.iter().enumerate() {
            debug!("${} = {}", register_name(index as u8), value);
        }
        debug!(
            "$ip = {} -> 0x{:02x}",
            self.ip,
            self.program.get(self.ip).copied().unwrap_or(0)
        );
        self.stack.dump();
        let cells: Vec<String> = self
            .ram
            .iter()
            .take(RAM_CELLS_TO_DUMP)
            .map(|c| format!("[{}]", c))
            .collect();
        debug!("ram: {}", cells.join(""));
    }
}
