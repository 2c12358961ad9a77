//! Engine configuration.
//!
//! All fields use `#[serde(rename_all = "camelCase")]`, and the struct is
//! `#[serde(default)]`, so partial JSON is accepted and missing fields take
//! their default value. The defaults reproduce the classic DOCTOR behaviour.
//!
//! ```json
//! { "turnCycle": 4, "noMatchPhrases": ["Please continue", "Hmmm"] }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The JSON is malformed or has wrongly typed fields.
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The values are well-formed but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the turn pipeline and the script format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Responses used when nothing matched, indexed by the turn counter.
    pub no_match_phrases: Vec<String>,
    /// Length of the turn counter cycle; memory responses surface on its
    /// last turn.
    pub turn_cycle: u32,
    /// Tokens that end a clause (compared case-insensitively).
    pub clause_delimiters: Vec<String>,
    /// First token of a fallback entry.
    pub fallback_prefix: String,
    /// First token of the memory entry.
    pub memory_prefix: String,
    /// Longest chain of `(= KEYWORD)` redirects followed in one turn.
    pub max_redirects: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            no_match_phrases: ["Please continue", "Hmmm", "Go on, please", "I see"]
                .into_iter()
                .map(String::from)
                .collect(),
            turn_cycle: 4,
            clause_delimiters: vec![".".into(), ",".into(), "BUT".into()],
            fallback_prefix: "NONE".into(),
            memory_prefix: "MEMORY".into(),
            max_redirects: 8,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks the values the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.turn_cycle == 0 {
            return Err(ConfigError::Invalid("turnCycle must be at least 1".into()));
        }
        if self.no_match_phrases.is_empty() {
            return Err(ConfigError::Invalid("noMatchPhrases must not be empty".into()));
        }
        if self.fallback_prefix.trim().is_empty() || self.memory_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("entry prefixes must not be empty".into()));
        }
        Ok(())
    }

    /// Returns `true` if `token` ends a clause.
    pub fn is_clause_delimiter(&self, token: &str) -> bool {
        self.clause_delimiters
            .iter()
            .any(|delimiter| delimiter.eq_ignore_ascii_case(token))
    }

    /// No-match phrase for a 1-based turn counter value.
    pub fn no_match_phrase(&self, turn: u32) -> &str {
        let len = self.no_match_phrases.len().max(1);
        let slot = (turn.max(1) as usize - 1) % len;
        self.no_match_phrases
            .get(slot)
            .map_or("", String::as_str)
    }
}
