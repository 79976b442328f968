//! Runtime configuration types.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration for the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Initial collection threshold in bytes. Doubles when exceeded.
    pub heap_capacity: usize,
    /// Operand stack size in bytes
    pub stack_size: u32,
    /// Whether GC is enabled (default: true)
    pub gc_enabled: bool,
    /// Print GC statistics after a run
    pub gc_stats: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heap_capacity: 1 << 20,
            stack_size: 1 << 16,
            gc_enabled: true,
            gc_stats: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RuntimeConfig::from_toml("heap_capacity = 4096\ngc_stats = true\n").unwrap();
        assert_eq!(config.heap_capacity, 4096);
        assert!(config.gc_stats);
        assert_eq!(config.stack_size, RuntimeConfig::default().stack_size);
        assert!(config.gc_enabled);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            RuntimeConfig::from_toml("jit = true"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/stil.toml")).unwrap_err();
        assert!(err.to_string().contains("stil.toml"));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = RuntimeConfig {
            stack_size: 512,
            gc_enabled: false,
            ..RuntimeConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_toml(&text).unwrap(), config);
    }
}
