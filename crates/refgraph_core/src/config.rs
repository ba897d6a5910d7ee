//! Engine configuration.
//!
//! # Responsibility
//! - Hold tunables for ancestry walks, promotion, and unshare cascades.
//! - Parse and validate JSON configuration supplied by the host.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - `max_ancestry_depth` is at least 1.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default upper bound on parent-chain hops in one ancestry walk.
pub const DEFAULT_MAX_ANCESTRY_DEPTH: usize = 256;

/// Errors from configuration parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// Input is not valid JSON for this schema.
    Parse(serde_json::Error),
    /// Parsed value violates a constraint.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Runtime settings for `ReferenceGraphEngine`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Hop limit for parent-chain walks; reaching it ends the walk as "safe".
    pub max_ancestry_depth: usize,
    /// Run the ownership promotion watcher on target snapshots.
    pub promote_on_snapshot: bool,
    /// When a folder is unshared on exit, also unshare its direct subjects.
    pub cascade_unshare_to_subjects: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ancestry_depth: DEFAULT_MAX_ANCESTRY_DEPTH,
            promote_on_snapshot: true,
            cascade_unshare_to_subjects: true,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ancestry_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_ancestry_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
