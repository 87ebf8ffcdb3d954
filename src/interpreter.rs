//! The fetch-decode-execute loop.
//!
//! Reads one opcode byte per step, dispatches through the shared instruction
//! catalog, and keeps going while the instruction pointer stays inside the
//! stream and no halt has been executed. Operand groups are resolved by
//! summing their terms; a memory-mode group turns the sum into a RAM index.

use crate::config::{MachineConfig, EPSILON};
use crate::error::RuntimeError;
use crate::instruction::{
    group_is_memory, metadata_group_mode, metadata_operand_count, OperandMode, OFFSET_WIDTH,
    REGISTER_COUNT,
};
use crate::machine::Machine;
use crate::opcode_tables::Opcode;
use log::debug;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

/// Three-way comparison codes left on the stack by `cmp`.
const CMP_EQUAL: f64 = 0.0;
const CMP_GREATER: f64 = 1.0;
const CMP_LOWER: f64 = -1.0;

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Continue with the next instruction
    Continue,
    /// Control transferred, ip already updated
    Jumped,
    /// Explicit halt
    Halted,
}

/// Executes a bytecode stream against a [`Machine`].
///
/// Input and output are injected so tests can drive `in`/`out`/`outc`
/// without touching the process's stdio.
pub struct Interpreter<R: BufRead, W: Write> {
    pub machine: Machine,
    input: R,
    pub output: W,
    instruction_count: u64,
    max_steps: Option<u64>,
}

impl Interpreter<BufReader<Stdin>, Stdout> {
    /// Interpreter wired to the process stdio.
    pub fn new(machine: Machine) -> Self {
        Self::with_io(machine, BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> Interpreter<R, W> {
    pub fn with_io(machine: Machine, input: R, output: W) -> Self {
        Interpreter {
            machine,
            input,
            output,
            instruction_count: 0,
            max_steps: None,
        }
    }

    pub fn set_max_steps(&mut self, max_steps: Option<u64>) {
        self.max_steps = max_steps;
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Run until halt, end of stream, or error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.machine.is_running() {
            if let Some(limit) = self.max_steps {
                if self.instruction_count >= limit {
                    return Err(RuntimeError::StepLimitExceeded(limit));
                }
            }
            self.instruction_count += 1;
            if let Err(e) = self.execute_instruction() {
                self.machine.dump();
                return Err(e);
            }
        }
        self.output.flush()?;
        debug!("executed {} instruction(s)", self.instruction_count);
        Ok(())
    }

    /// Fetch and dispatch a single instruction.
    pub fn execute_instruction(&mut self) -> Result<ExecutionResult, RuntimeError> {
        let at = self.machine.ip;
        let opcode_byte = self.machine.fetch_byte()?;
        let opcode =
            Opcode::from_byte(opcode_byte).ok_or(RuntimeError::UnknownOpcode(opcode_byte, at))?;

        match opcode {
            Opcode::Push => {
                let value = self.read_value()?;
                self.machine.stack.push(value)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Pop => {
                let value = self.machine.stack.pop()?;
                self.write_value(value)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                // The value pushed last is the left-hand side.
                let lhs = self.machine.stack.pop()?;
                let rhs = self.machine.stack.pop()?;
                let result = match opcode {
                    Opcode::Add => lhs + rhs,
                    Opcode::Sub => lhs - rhs,
                    Opcode::Mul => lhs * rhs,
                    // Unguarded: IEEE-754 inf/NaN propagate on zero divisors
                    Opcode::Div => lhs / rhs,
                    _ => unreachable!(),
                };
                self.machine.stack.push(result)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Sqrt => {
                let value = self.machine.stack.pop()?;
                self.machine.stack.push(value.sqrt())?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Out => {
                let value = self.machine.stack.pop()?;
                write!(self.output, "{}", value)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Outc => {
                let value = self.machine.stack.pop()?;
                write!(self.output, "{}", (value as u8) as char)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::In => {
                let mut line = String::new();
                self.input.read_line(&mut line)?;
                let value: f64 = line
                    .trim()
                    .parse()
                    .map_err(|_| RuntimeError::BadInput(line.trim().to_string()))?;
                self.machine.stack.push(value)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Jmp => {
                let target = self.machine.fetch_offset()?;
                self.machine.ip = target as usize;
                Ok(ExecutionResult::Jumped)
            }
            Opcode::Call => {
                // Return address is the instruction after the offset field
                let return_to = (self.machine.ip + OFFSET_WIDTH) as f64;
                self.machine.stack.push(return_to)?;
                let target = self.machine.fetch_offset()?;
                self.machine.ip = target as usize;
                Ok(ExecutionResult::Jumped)
            }
            Opcode::Ret => {
                let return_to = self.machine.stack.pop()?;
                self.machine.ip = return_to as usize;
                Ok(ExecutionResult::Jumped)
            }
            Opcode::Cmp => {
                let second = self.machine.stack.pop()?;
                let first = self.machine.stack.pop()?;
                self.machine.stack.push(first)?;
                self.machine.stack.push(second)?;
                let code = if (first - second).abs() < EPSILON {
                    CMP_EQUAL
                } else if first > second {
                    CMP_GREATER
                } else {
                    CMP_LOWER
                };
                self.machine.stack.push(code)?;
                Ok(ExecutionResult::Continue)
            }
            Opcode::Je => self.conditional_jump(|flag| (flag - CMP_EQUAL).abs() < EPSILON),
            Opcode::Jne => self.conditional_jump(|flag| (flag - CMP_EQUAL).abs() > EPSILON),
            Opcode::Jl => self.conditional_jump(|flag| (flag - CMP_LOWER).abs() < EPSILON),
            Opcode::Jg => self.conditional_jump(|flag| (flag - CMP_GREATER).abs() < EPSILON),
            Opcode::Halt => {
                self.machine.halt();
                Ok(ExecutionResult::Halted)
            }
        }
    }

    /// Peek the comparison code left by `cmp`; pop it and jump when `taken`
    /// holds, otherwise step over the offset field and leave the code on the
    /// stack.
    fn conditional_jump(
        &mut self,
        taken: impl Fn(f64) -> bool,
    ) -> Result<ExecutionResult, RuntimeError> {
        let flag = self.machine.stack.peek()?;
        if taken(flag) {
            self.machine.stack.pop_discard()?;
            let target = self.machine.fetch_offset()?;
            self.machine.ip = target as usize;
            Ok(ExecutionResult::Jumped)
        } else {
            self.machine.ip += OFFSET_WIDTH;
            Ok(ExecutionResult::Continue)
        }
    }

    /// Operand-value resolution: decode the metadata byte, sum every term,
    /// and dereference through RAM when the group is memory-addressed.
    fn read_value(&mut self) -> Result<f64, RuntimeError> {
        let metadata = self.machine.fetch_byte()?;
        let operand_count = metadata_operand_count(metadata);
        let group_mode = metadata_group_mode(metadata);

        let total = self.sum_operand_group(operand_count)?;

        if group_is_memory(group_mode) {
            let index = self.ram_index(total)?;
            Ok(self.machine.ram[index])
        } else {
            Ok(total)
        }
    }

    /// Operand-destination resolution: store into RAM when memory-addressed,
    /// otherwise into the single register operand.
    fn write_value(&mut self, value: f64) -> Result<(), RuntimeError> {
        let metadata = self.machine.fetch_byte()?;
        let operand_count = metadata_operand_count(metadata);
        let group_mode = metadata_group_mode(metadata);

        if group_is_memory(group_mode) {
            let total = self.sum_operand_group(operand_count)?;
            let index = self.ram_index(total)?;
            self.machine.ram[index] = value;
            return Ok(());
        }

        let tag_at = self.machine.ip;
        let tag = self.machine.fetch_byte()?;
        match OperandMode::from_tag(tag, tag_at)? {
            OperandMode::Register => {
                let register = self.fetch_register()?;
                self.machine.registers[register] = value;
                Ok(())
            }
            OperandMode::Immediate => Err(RuntimeError::StoreIntoImmediate(tag_at)),
        }
    }

    /// Read `operand_count` tagged terms and add them up.
    fn sum_operand_group(&mut self, operand_count: usize) -> Result<f64, RuntimeError> {
        let mut total = 0.0;
        for _ in 0..operand_count {
            let tag_at = self.machine.ip;
            let tag = self.machine.fetch_byte()?;
            match OperandMode::from_tag(tag, tag_at)? {
                OperandMode::Register => {
                    let register = self.fetch_register()?;
                    total += self.machine.registers[register];
                }
                OperandMode::Immediate => {
                    total += self.machine.fetch_f64()?;
                }
            }
        }
        Ok(total)
    }

    fn fetch_register(&mut self) -> Result<usize, RuntimeError> {
        let index_at = self.machine.ip;
        let index = self.machine.fetch_byte()?;
        if (index as usize) < REGISTER_COUNT {
            Ok(index as usize)
        } else {
            Err(RuntimeError::BadRegisterIndex(index, index_at))
        }
    }

    /// A memory-addressed group must sum to a non-negative integer (within
    /// tolerance) that indexes an existing RAM cell. NaN fails every
    /// comparison below, so it needs its own rejection up front.
    fn ram_index(&self, value: f64) -> Result<usize, RuntimeError> {
        let rounded = value.round();
        if !rounded.is_finite() || (value - rounded).abs() > EPSILON || rounded < 0.0 {
            return Err(RuntimeError::NonIntegralRamIndex(value));
        }
        let index = rounded as i64;
        if index as usize >= self.machine.ram.len() {
            return Err(RuntimeError::RamIndexOutOfRange(
                index,
                self.machine.ram.len(),
            ));
        }
        Ok(index as usize)
    }
}

/// Convenience runner used by the binary: machine from config, stdio wiring,
/// step limit from config.
pub fn run_program(program: Vec<u8>, config: &MachineConfig) -> Result<(), RuntimeError> {
    let machine = Machine::with_config(program, config);
    let mut interpreter = Interpreter::new(machine);
    interpreter.set_max_steps(config.max_steps);
    interpreter.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::error::StackError;

    fn run_capture(source: &str) -> (Machine, Vec<u8>) {
        run_capture_with_input(source, "")
    }

    fn run_capture_with_input(source: &str, input: &str) -> (Machine, Vec<u8>) {
        let program = assemble(source).expect("source must assemble");
        let machine = Machine::new(program);
        let mut interpreter =
            Interpreter::with_io(machine, input.as_bytes(), Vec::new());
        interpreter.run().expect("program must run");
        (interpreter.machine, interpreter.output)
    }

    #[test]
    fn test_push_pop_register_exact() {
        let (machine, _) = run_capture("push 42.125\npop cx\nhalt\n");
        assert_eq!(machine.registers[2], 42.125);
    }

    #[test]
    fn test_example_program_prints_backspace_char() {
        let (_, output) = run_capture("push 5\npush 3\nadd\noutc\nhalt\n");
        assert_eq!(output, vec![8u8]);
    }

    #[test]
    fn test_out_prints_number() {
        let (_, output) = run_capture("push 2\npush 5\ndiv\nout\nhalt\n");
        assert_eq!(String::from_utf8(output).unwrap(), "2.5");
    }

    #[test]
    fn test_memory_store_and_load() {
        let (machine, _) = run_capture(
            "push 7\npop [3]\npush [3]\npop ax\nhalt\n",
        );
        assert_eq!(machine.ram[3], 7.0);
        assert_eq!(machine.registers[0], 7.0);
    }

    #[test]
    fn test_memory_index_through_register_sum() {
        let (machine, _) = run_capture(
            "push 4\npop ax\npush 9\npop [ax+1]\nhalt\n",
        );
        assert_eq!(machine.ram[5], 9.0);
    }

    #[test]
    fn test_cmp_equal_takes_je() {
        let (_, output) = run_capture(
            "push 3\npush 3\ncmp\nje yes\npush 110\noutc\nhalt\nyes:\npush 121\noutc\nhalt\n",
        );
        assert_eq!(output, b"y");
    }

    #[test]
    fn test_cmp_greater_takes_jg() {
        let (_, output) = run_capture(
            "push 5\npush 2\ncmp\njg yes\npush 110\noutc\nhalt\nyes:\npush 121\noutc\nhalt\n",
        );
        assert_eq!(output, b"y");
    }

    #[test]
    fn test_cmp_lower_takes_jl() {
        let (_, output) = run_capture(
            "push 1\npush 9\ncmp\njl yes\npush 110\noutc\nhalt\nyes:\npush 121\noutc\nhalt\n",
        );
        assert_eq!(output, b"y");
    }

    #[test]
    fn test_untaken_branch_leaves_flag_on_stack() {
        let (mut machine, _) = run_capture("push 1\npush 2\ncmp\nje skip\nskip2:\nhalt\nskip:\nhalt\n");
        // je not taken: comparison code (-1) stays on top
        assert_eq!(machine.stack.pop().unwrap(), -1.0);
    }

    #[test]
    fn test_call_and_ret() {
        let (_, output) = run_capture(
            "call sub\npush 33\noutc\nhalt\nsub:\npush 63\noutc\nret\n",
        );
        assert_eq!(output, b"?!");
    }

    #[test]
    fn test_in_pushes_parsed_number() {
        let (machine, _) = run_capture_with_input("in\npop dx\nhalt\n", "6.25\n");
        assert_eq!(machine.registers[3], 6.25);
    }

    #[test]
    fn test_bad_input_is_an_error() {
        let program = assemble("in\nhalt\n").unwrap();
        let mut interpreter =
            Interpreter::with_io(Machine::new(program), "nonsense\n".as_bytes(), Vec::new());
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::BadInput("nonsense".to_string()))
        );
    }

    #[test]
    fn test_store_into_immediate_rejected() {
        let program = assemble("push 1\npop 5\nhalt\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        assert!(matches!(
            interpreter.run(),
            Err(RuntimeError::StoreIntoImmediate(_))
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let mut interpreter =
            Interpreter::with_io(Machine::new(vec![0x60]), "".as_bytes(), Vec::new());
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::UnknownOpcode(0x60, 0))
        );
    }

    #[test]
    fn test_non_integral_ram_index() {
        let program = assemble("push [1.5]\nhalt\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::NonIntegralRamIndex(1.5))
        );
    }

    #[test]
    fn test_nan_ram_index_rejected() {
        // 0/0 produces NaN, which fails every ordered comparison; the index
        // check must still reject it instead of saturating to cell 0
        let program = assemble("push 0\npush 0\ndiv\npop ax\npush [ax]\nhalt\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        match interpreter.run() {
            Err(RuntimeError::NonIntegralRamIndex(value)) => assert!(value.is_nan()),
            other => panic!("expected a RAM index error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_register_index_rejected() {
        use crate::instruction::{pack_metadata, MODE_REGISTER};
        // pop into register index 9: no such register. The reported offset
        // points at the payload byte.
        let mut program = assemble("push 1\n").unwrap();
        program.extend([1, pack_metadata(1, 0), MODE_REGISTER, 9]);
        let payload_at = program.len() - 1;
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::BadRegisterIndex(9, payload_at))
        );
    }

    #[test]
    fn test_ram_index_out_of_range() {
        let program = assemble("push [9000]\nhalt\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::RamIndexOutOfRange(9000, 500))
        );
    }

    #[test]
    fn test_stack_underflow_surfaces() {
        let program = assemble("add\nhalt\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::Stack(StackError::Underflow))
        );
    }

    #[test]
    fn test_division_by_zero_is_unguarded() {
        let (mut machine, _) = run_capture("push 0\npush 1\ndiv\nhalt\n");
        assert_eq!(machine.stack.pop().unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_step_limit() {
        let program = assemble("loop:\njmp loop\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        interpreter.set_max_steps(Some(10));
        assert_eq!(
            interpreter.run(),
            Err(RuntimeError::StepLimitExceeded(10))
        );
    }

    #[test]
    fn test_execution_stops_at_end_of_stream() {
        let program = assemble("push 1\npop ax\n").unwrap();
        let mut interpreter = Interpreter::with_io(Machine::new(program), "".as_bytes(), Vec::new());
        interpreter.run().unwrap();
        assert_eq!(interpreter.instruction_count(), 2);
    }
}
