//! Circuit emission settings, loadable from TOML.
//!
//! ```toml
//! # circus.toml
//! version = "2.0.0"
//! wire_offset = 0
//! header_comment = "generated by my frontend"   # "" omits the comment
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CircuitError;

/// Banner written at the top of every relation unless overridden.
pub const DEFAULT_HEADER_COMMENT: &str = "Circuit generated by the \"Circus\" Expression Compiler";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// IR version written in every emitted file.
    pub version: String,
    /// First wire label of the top-level scope.
    pub wire_offset: u64,
    /// Comment line written after the `circuit;` header. Empty omits it.
    pub header_comment: String,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            version: "2.0.0".to_string(),
            wire_offset: 0,
            header_comment: DEFAULT_HEADER_COMMENT.to_string(),
        }
    }
}

impl CircuitConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CircuitError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CircuitError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
