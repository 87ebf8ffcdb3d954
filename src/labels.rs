//! Two-pass label resolution.
//!
//! While the assembler scans the source, label declarations bind a name to
//! the current output-byte offset and label operands are recorded as pending
//! references pointing at their 4-byte placeholder slot. After the whole
//! program has been emitted, the patch pass overwrites every placeholder with
//! the target's absolute offset. A reference with no matching declaration is
//! an error at that point.

use crate::error::AsmError;
use crate::instruction::OFFSET_WIDTH;
use indexmap::IndexMap;
use log::debug;

/// A pending forward reference: which label, and where in the output stream
/// its placeholder offset lives.
#[derive(Debug, Clone)]
struct PendingReference {
    name: String,
    /// Byte offset of the 4-byte operand slot (not of the opcode byte)
    patch_at: usize,
}

/// Declared labels and unresolved references for one assembly unit.
#[derive(Debug, Default)]
pub struct LabelTable {
    /// name -> declared absolute byte offset, in declaration order
    declared: IndexMap<String, u32>,
    pending: Vec<PendingReference>,
}

/// Labels are restricted identifiers: ASCII letters, digits and underscores.
pub fn is_valid_label_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `offset`. Called when a `name:` line is scanned;
    /// consumes no output bytes. Redeclaration is rejected.
    pub fn declare(&mut self, name: &str, offset: u32, line: usize) -> Result<(), AsmError> {
        if !is_valid_label_name(name) {
            return Err(AsmError::BadLabelName(line, name.to_string()));
        }
        if self.declared.contains_key(name) {
            return Err(AsmError::DuplicateLabel(line, name.to_string()));
        }
        debug!("label '{}' declared at offset {}", name, offset);
        self.declared.insert(name.to_string(), offset);
        Ok(())
    }

    /// Record a label operand whose placeholder sits at `patch_at`. The
    /// target may be declared later (forward reference) or earlier; both go
    /// through the same patch pass.
    pub fn reference(&mut self, name: &str, patch_at: usize, line: usize) -> Result<(), AsmError> {
        if !is_valid_label_name(name) {
            return Err(AsmError::BadLabelName(line, name.to_string()));
        }
        debug!("label '{}' referenced, patch slot at {}", name, patch_at);
        self.pending.push(PendingReference {
            name: name.to_string(),
            patch_at,
        });
        Ok(())
    }

    /// Patch pass: overwrite every placeholder in `output` with its target's
    /// absolute offset, little-endian.
    pub fn patch(&self, output: &mut [u8]) -> Result<(), AsmError> {
        for reference in &self.pending {
            let target = self
                .declared
                .get(&reference.name)
                .copied()
                .ok_or_else(|| AsmError::UnresolvedLabel(reference.name.clone()))?;

            debug!(
                "patching '{}' -> offset {} at slot {}",
                reference.name, target, reference.patch_at
            );
            let slot = &mut output[reference.patch_at..reference.patch_at + OFFSET_WIDTH];
            slot.copy_from_slice(&target.to_le_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_name_grammar() {
        assert!(is_valid_label_name("loop"));
        assert!(is_valid_label_name("block_2"));
        assert!(is_valid_label_name("_9"));
        assert!(!is_valid_label_name(""));
        assert!(!is_valid_label_name("bad name"));
        assert!(!is_valid_label_name("dash-ed"));
    }

    #[test]
    fn test_backward_reference_patches() {
        let mut labels = LabelTable::new();
        labels.declare("start", 0, 1).unwrap();
        labels.reference("start", 6, 3).unwrap();

        let mut output = vec![0xff; 10];
        labels.patch(&mut output).unwrap();
        assert_eq!(&output[6..10], &0u32.to_le_bytes());
    }

    #[test]
    fn test_forward_reference_patches() {
        let mut labels = LabelTable::new();
        labels.reference("end", 1, 1).unwrap();
        labels.declare("end", 0x0102_0304, 9).unwrap();

        let mut output = vec![0u8; 8];
        labels.patch(&mut output).unwrap();
        assert_eq!(&output[1..5], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_unresolved_reference_is_an_error() {
        let mut labels = LabelTable::new();
        labels.reference("nowhere", 0, 2).unwrap();

        let mut output = vec![0u8; 5];
        assert_eq!(
            labels.patch(&mut output),
            Err(AsmError::UnresolvedLabel("nowhere".to_string()))
        );
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut labels = LabelTable::new();
        labels.declare("x", 0, 1).unwrap();
        assert_eq!(
            labels.declare("x", 4, 7),
            Err(AsmError::DuplicateLabel(7, "x".to_string()))
        );
    }

    #[test]
    fn test_declared_but_unused_label_is_legal() {
        let mut labels = LabelTable::new();
        labels.declare("unused", 12, 1).unwrap();
        let mut output = vec![0u8; 4];
        labels.patch(&mut output).unwrap();
        assert_eq!(output, vec![0u8; 4]);
    }
}
