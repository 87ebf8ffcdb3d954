//! Source-to-bytecode translation.
//!
//! One linear scan over the source lines: label declarations bind the current
//! output offset, every other non-empty line is parsed into a [`Command`],
//! encoded, and appended to the in-memory output buffer. Control-transfer
//! operands are emitted as 4-byte placeholders and recorded with the
//! [`LabelTable`]; after the scan a single patch pass rewrites them with the
//! resolved absolute offsets, and only then is the buffer final. Any error is
//! terminal for the run.

use crate::error::AsmError;
use crate::instruction::{
    pack_metadata, register_index, MODE_IMMEDIATE, MODE_MEMORY, MODE_REGISTER, OFFSET_WIDTH,
};
use crate::labels::{is_valid_label_name, LabelTable};
use crate::opcode_tables::{by_mnemonic, Opcode};
use log::debug;

/// At most this many chained sub-operands per instruction. The metadata
/// count field is 3 bits wide but existing programs never chain more.
const MAX_OPERANDS: usize = 3;

/// Emitted into control-transfer operand slots until the patch pass runs.
const PLACEHOLDER_BYTE: u8 = 0xFF;

/// A parsed sub-operand of one instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Register(u8),
    Immediate(f64),
}

/// One parsed source line, before encoding. Transient: built, encoded,
/// flushed, dropped.
#[derive(Debug)]
struct Command {
    opcode: Opcode,
    /// Empty for zero-operand and control-transfer instructions
    operands: Vec<Operand>,
    /// Group addressing mode; only the memory bit is ever set here
    group_mode: u8,
    /// Label operand of a control-transfer instruction
    target: Option<String>,
}

/// Translates one assembly unit into a bytecode buffer.
pub struct Assembler {
    labels: LabelTable,
    output: Vec<u8>,
}

/// Assemble a complete source text into its bytecode image.
pub fn assemble(source: &str) -> Result<Vec<u8>, AsmError> {
    Assembler::new().run(source)
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            labels: LabelTable::new(),
            output: Vec::new(),
        }
    }

    /// Drive the two-phase emission: provisional write, then patch pass.
    pub fn run(mut self, source: &str) -> Result<Vec<u8>, AsmError> {
        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = normalize_line(raw);
            if line.is_empty() {
                continue;
            }

            if let Some(name) = label_declaration(&line) {
                self.labels
                    .declare(name, self.output.len() as u32, line_no)?;
            } else {
                let command = self.parse_command(&line, line_no)?;
                self.encode_command(&command, line_no)?;
            }
        }

        self.labels.patch(&mut self.output)?;
        debug!("assembled {} bytes", self.output.len());
        Ok(self.output)
    }

    /// Split a normalized line into mnemonic and argument text and parse both.
    fn parse_command(&mut self, line: &str, line_no: usize) -> Result<Command, AsmError> {
        let (mnemonic, args) = match line.split_once(' ') {
            Some((m, a)) => (m, a.trim()),
            None => (line, ""),
        };

        let descriptor = by_mnemonic(mnemonic)
            .ok_or_else(|| AsmError::UnknownMnemonic(line_no, mnemonic.to_string()))?;

        if descriptor.operand_count == 0 {
            if !args.is_empty() {
                return Err(AsmError::ArityMismatch(
                    line_no,
                    mnemonic.to_string(),
                    descriptor.operand_count,
                ));
            }
            return Ok(Command {
                opcode: descriptor.opcode,
                operands: Vec::new(),
                group_mode: 0,
                target: None,
            });
        }

        if args.is_empty() {
            return Err(AsmError::ArityMismatch(
                line_no,
                mnemonic.to_string(),
                descriptor.operand_count,
            ));
        }

        if descriptor.opcode.is_control_transfer() {
            // The sole argument of a jump/call form is a bare label
            if !is_valid_label_name(args) {
                return Err(AsmError::BadLabelName(line_no, args.to_string()));
            }
            return Ok(Command {
                opcode: descriptor.opcode,
                operands: Vec::new(),
                group_mode: 0,
                target: Some(args.to_string()),
            });
        }

        // Optional enclosing brackets mark the whole group as memory-indexed
        let opens = args.starts_with('[');
        let closes = args.ends_with(']');
        if opens != closes {
            return Err(AsmError::UnbalancedBrackets(line_no));
        }
        let (inner, group_mode) = if opens {
            (&args[1..args.len() - 1], MODE_MEMORY)
        } else {
            (args, 0)
        };

        let operands = parse_operand_chain(inner, line_no)?;
        if operands.is_empty() || operands.len() > MAX_OPERANDS {
            return Err(AsmError::BadCommandFormat(line_no, line.to_string()));
        }

        Ok(Command {
            opcode: descriptor.opcode,
            operands,
            group_mode,
            target: None,
        })
    }

    /// Encode one command and flush it to the output stream, registering the
    /// label reference for control transfers.
    fn encode_command(&mut self, command: &Command, line_no: usize) -> Result<(), AsmError> {
        let start = self.output.len();
        self.output.push(command.opcode.as_byte());

        if let Some(ref target) = command.target {
            let patch_at = self.output.len();
            self.labels.reference(target, patch_at, line_no)?;
            self.output
                .extend(std::iter::repeat(PLACEHOLDER_BYTE).take(OFFSET_WIDTH));
        } else if !command.operands.is_empty() {
            self.output
                .push(pack_metadata(command.operands.len(), command.group_mode));
            for operand in &command.operands {
                match *operand {
                    Operand::Register(index) => {
                        self.output.push(MODE_REGISTER);
                        self.output.push(index);
                    }
                    Operand::Immediate(value) => {
                        self.output.push(MODE_IMMEDIATE);
                        self.output.extend(value.to_le_bytes());
                    }
                }
            }
        }

        debug!(
            "{} encoded as {} byte(s) at offset {}",
            command.opcode.mnemonic(),
            self.output.len() - start,
            start
        );
        Ok(())
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the comment tail (`;`) and collapse whitespace runs.
fn normalize_line(raw: &str) -> String {
    let uncommented = raw.split(';').next().unwrap_or("");
    uncommented.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A line of the form `identifier:` declares a label. Returns the identifier;
/// grammar violations are caught by the declaration itself.
fn label_declaration(line: &str) -> Option<&str> {
    line.strip_suffix(':').filter(|name| !name.contains(' '))
}

/// Parse a `+`/`-`-chained operand group, e.g. `ax+2` or `bx + cx + 1`.
///
/// Both separators are accepted but all terms are summed at runtime. The
/// sign of a `-` separator is dropped, not applied; existing programs rely
/// on the additive reading, so it stays.
fn parse_operand_chain(text: &str, line_no: usize) -> Result<Vec<Operand>, AsmError> {
    let chars: Vec<char> = text.chars().filter(|c| *c != ' ').collect();
    let mut operands = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        operands.push(parse_operand(&chars, &mut i, line_no)?);

        if i < chars.len() {
            let sep = chars[i];
            if sep != '+' && sep != '-' {
                return Err(AsmError::BadSeparator(line_no, sep));
            }
            i += 1;
        }
    }

    Ok(operands)
}

/// Parse a single register token or numeric literal starting at `*i`.
fn parse_operand(chars: &[char], i: &mut usize, line_no: usize) -> Result<Operand, AsmError> {
    let start = *i;

    if chars[*i].is_ascii_alphabetic() {
        while *i < chars.len() && chars[*i].is_ascii_alphanumeric() {
            *i += 1;
        }
        let token: String = chars[start..*i].iter().collect();
        let index = register_index(&token)
            .ok_or_else(|| AsmError::UnknownRegister(line_no, token.clone()))?;
        return Ok(Operand::Register(index));
    }

    // Numeric literal: optional sign, digits/dot, optional exponent
    if chars[*i] == '+' || chars[*i] == '-' {
        *i += 1;
    }
    while *i < chars.len() && (chars[*i].is_ascii_digit() || chars[*i] == '.') {
        *i += 1;
    }
    if *i < chars.len() && (chars[*i] == 'e' || chars[*i] == 'E') {
        *i += 1;
        if *i < chars.len() && (chars[*i] == '+' || chars[*i] == '-') {
            *i += 1;
        }
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
    }

    let token: String = chars[start..*i].iter().collect();
    token
        .parse::<f64>()
        .map(Operand::Immediate)
        .map_err(|_| AsmError::BadOperand(line_no, token.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn immediate_record(opcode: u8, value: f64) -> Vec<u8> {
        let mut bytes = vec![opcode, pack_metadata(1, 0), MODE_IMMEDIATE];
        bytes.extend(value.to_le_bytes());
        bytes
    }

    #[test]
    fn test_example_program_byte_exact() {
        let source = "push 5\npush 3\nadd\noutc\nhalt\n";
        let program = assemble(source).unwrap();

        let mut expected = immediate_record(0, 5.0);
        expected.extend(immediate_record(0, 3.0));
        expected.push(2); // add
        expected.push(11); // outc
        expected.push(255); // halt
        assert_eq!(program, expected);
    }

    #[test]
    fn test_register_operand_encoding() {
        let program = assemble("pop bx\n").unwrap();
        assert_eq!(
            program,
            vec![1, pack_metadata(1, 0), MODE_REGISTER, 1]
        );
    }

    #[test]
    fn test_memory_group_encoding() {
        let program = assemble("push [ax+2]\n").unwrap();
        let mut expected = vec![
            0,
            pack_metadata(2, MODE_MEMORY),
            MODE_REGISTER,
            0,
            MODE_IMMEDIATE,
        ];
        expected.extend(2.0f64.to_le_bytes());
        assert_eq!(program, expected);
    }

    #[test]
    fn test_minus_separator_parses_as_additional_term() {
        // Subtraction is parsed but folded additively, as documented
        let a = assemble("push 5-3\n").unwrap();
        let b = assemble("push 5+3\n").unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(crate::instruction::metadata_operand_count(a[1]), 2);
    }

    #[test]
    fn test_forward_jump_back_patched() {
        let source = "jmp end\npush 1\nend:\nhalt\n";
        let program = assemble(source).unwrap();

        // jmp record is 5 bytes, push record is 11, so `end` binds to 16
        assert_eq!(program[0], 8);
        assert_eq!(&program[1..5], &16u32.to_le_bytes());
        assert_eq!(program[16], 255);
    }

    #[test]
    fn test_backward_jump_back_patched() {
        let source = "loop:\npush 1\njmp loop\n";
        let program = assemble(source).unwrap();
        let jmp_at = program.len() - 5;
        assert_eq!(program[jmp_at], 8);
        assert_eq!(&program[jmp_at + 1..], &0u32.to_le_bytes());
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert_eq!(
            assemble("foo 1\n"),
            Err(AsmError::UnknownMnemonic(1, "foo".to_string()))
        );
    }

    #[test]
    fn test_unknown_register() {
        assert_eq!(
            assemble("push ex\n"),
            Err(AsmError::UnknownRegister(1, "ex".to_string()))
        );
    }

    #[test]
    fn test_unbalanced_brackets() {
        assert_eq!(
            assemble("push [ax\n"),
            Err(AsmError::UnbalancedBrackets(1))
        );
        assert_eq!(
            assemble("push ax]\n"),
            Err(AsmError::UnbalancedBrackets(1))
        );
    }

    #[test]
    fn test_arity_mismatch() {
        assert_eq!(
            assemble("add 1\n"),
            Err(AsmError::ArityMismatch(1, "add".to_string(), 0))
        );
        assert_eq!(
            assemble("push\n"),
            Err(AsmError::ArityMismatch(1, "push".to_string(), 1))
        );
    }

    #[test]
    fn test_bad_separator() {
        assert_eq!(
            assemble("push 1,2\n"),
            Err(AsmError::BadSeparator(1, ','))
        );
    }

    #[test]
    fn test_bad_label_operand() {
        assert_eq!(
            assemble("jmp bad-name\n"),
            Err(AsmError::BadLabelName(1, "bad-name".to_string()))
        );
    }

    #[test]
    fn test_unresolved_label_reported() {
        assert_eq!(
            assemble("jmp nowhere\nhalt\n"),
            Err(AsmError::UnresolvedLabel("nowhere".to_string()))
        );
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let source = "; whole-line comment\n\n   push 1 ; trailing\nhalt\n";
        let program = assemble(source).unwrap();
        assert_eq!(program.len(), 12);
    }

    #[test]
    fn test_negative_immediate() {
        let program = assemble("push -2.5\n").unwrap();
        assert_eq!(&program[3..11], &(-2.5f64).to_le_bytes());
    }
}
