//! Machine configuration.
//!
//! Compile-time defaults cover ordinary programs; a TOML file can override
//! any field, e.g.
//!
//! ```toml
//! ram-cells = 1000
//! stack-capacity = 32
//! max-steps = 500000
//! ```

use serde::Deserialize;
use std::path::Path;

/// Default number of f64 RAM cells.
pub const DEFAULT_RAM_CELLS: usize = 500;
/// Default initial execution-stack capacity.
pub const DEFAULT_STACK_CAPACITY: usize = 10;
/// Floating-point tolerance used by memory indexing and comparisons.
pub const EPSILON: f64 = 0.001;
/// How many leading RAM cells the diagnostic dump prints.
pub const RAM_CELLS_TO_DUMP: usize = 15;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MachineConfig {
    pub ram_cells: usize,
    pub stack_capacity: usize,
    /// Abort execution after this many instructions; None runs unbounded
    pub max_steps: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            ram_cells: DEFAULT_RAM_CELLS,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_steps: None,
        }
    }
}

impl MachineConfig {
    /// Load from a TOML file; missing fields fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("bad config {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.ram_cells, 500);
        assert_eq!(config.stack_capacity, 10);
        assert_eq!(config.max_steps, None);
    }

    #[test]
    fn test_toml_override() {
        let config: MachineConfig =
            toml::from_str("ram-cells = 64\nmax-steps = 1000\n").unwrap();
        assert_eq!(config.ram_cells, 64);
        assert_eq!(config.stack_capacity, DEFAULT_STACK_CAPACITY);
        assert_eq!(config.max_steps, Some(1000));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<MachineConfig>("vram-cells = 9\n").is_err());
    }
}
