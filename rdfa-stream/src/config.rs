//! Session configuration.
//!
//! All fields have defaults, so an empty TOML document is a valid config.
//!
//! ```
//! use rdfa_stream::BridgeConfig;
//!
//! let config = BridgeConfig::from_toml_str("chunk_capacity = 512\n[engine]\nemit_warnings = false\n").unwrap();
//! assert_eq!(config.chunk_capacity, 512);
//! assert!(!config.engine.emit_warnings);
//! assert!(config.engine.emit_prefix_mappings);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default capacity requested from the consumer on each fill.
pub const DEFAULT_CHUNK_CAPACITY: usize = 4096;

/// Default element nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Bridge-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Maximum number of bytes requested per fill.
    pub chunk_capacity: usize,
    /// Byte written over the unused tail of each fill buffer.
    pub pad_byte: Option<u8>,
    pub engine: EngineConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            pad_byte: None,
            engine: EngineConfig::default(),
        }
    }
}

/// Settings for the bundled RDFa engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Report `@prefix` and `xmlns:` declarations to the consumer.
    pub emit_prefix_mappings: bool,
    /// Report processor warnings in the processor graph.
    pub emit_warnings: bool,
    /// Treat HTML void elements (`<br>`, `<img>`, ...) as self-closing.
    pub html_void_elements: bool,
    /// Maximum element nesting depth.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            emit_prefix_mappings: true,
            emit_warnings: true,
            html_void_elements: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_capacity == 0 {
            return Err(ConfigError::Invalid("chunk_capacity must be at least 1".into()));
        }
        if self.engine.max_depth == 0 {
            return Err(ConfigError::Invalid("engine.max_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BridgeConfig::from_toml_str("").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = BridgeConfig::from_toml_str(
            r#"
            chunk_capacity = 64
            pad_byte = 32

            [engine]
            emit_prefix_mappings = false
            emit_warnings = false
            html_void_elements = false
            max_depth = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_capacity, 64);
        assert_eq!(config.pad_byte, Some(b' '));
        assert_eq!(
            config.engine,
            EngineConfig {
                emit_prefix_mappings: false,
                emit_warnings: false,
                html_void_elements: false,
                max_depth: 8,
            }
        );
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = BridgeConfig::from_toml_str("chunk_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = BridgeConfig::from_toml_str("[engine]\nmax_depth = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = BridgeConfig::from_toml_str("chunk_size = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load("/nonexistent/rdfa-stream.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
