//! Engine configuration and its fluent builder.
//!
//! # Example
//!
//! ```rust
//! use feedindex_core::config::EngineBuilder;
//!
//! let config = EngineBuilder::new()
//!     .prefix("myapp:")
//!     .default_marker_name("_last_seen")
//!     .build_config();
//! assert_eq!(config.prefix, "myapp:");
//! ```

use serde::{Deserialize, Serialize};

use crate::keys::KeyNamer;

pub const DEFAULT_PREFIX: &str = "feedindex:";
pub const DEFAULT_MARKER_NAME: &str = "_default";

/// Immutable settings shared by the engine and its layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace prepended to every storage key.
    pub prefix: String,
    /// Marker name used when none is given, and the one advanced by forward
    /// pagination.
    pub default_marker_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.into(),
            default_marker_name: DEFAULT_MARKER_NAME.into(),
        }
    }
}

impl EngineConfig {
    pub fn key_namer(&self) -> KeyNamer {
        KeyNamer::new(self.prefix.clone())
    }
}

/// Fluent builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Set the key namespace.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set the name of the default marker.
    pub fn default_marker_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_marker_name = name.into();
        self
    }

    pub fn build_config(self) -> EngineConfig {
        self.config
    }
}
