//! Sync tunables with environment overrides
//!
//! Defaults match the product behavior (15-minute pairing window, port
//! 8080); every knob can be overridden through `TALLY_*` environment
//! variables for testing on constrained networks.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Runtime settings for the pairing/sync subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Port the pairing endpoint listens on
    pub port: u16,
    /// Pairing session lifetime
    pub session_ttl: Duration,
    /// Minimum similarity score for item suggestions
    pub min_similarity: f32,
    /// Maximum number of item suggestions per unknown item
    pub max_suggestions: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            session_ttl: Duration::from_secs(15 * 60),
            min_similarity: 0.5,
            max_suggestions: 5,
        }
    }
}

impl SyncSettings {
    /// Load settings from the process environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let port = match trimmed(&lookup, "TALLY_SYNC_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Validation("TALLY_SYNC_PORT must be a port number".into()))?,
            None => defaults.port,
        };

        let session_ttl = match trimmed(&lookup, "TALLY_SESSION_TTL_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    Error::Validation("TALLY_SESSION_TTL_SECS must be an integer".into())
                })?;
                if !(60..=3_600).contains(&secs) {
                    return Err(Error::Validation(
                        "TALLY_SESSION_TTL_SECS must be in [60, 3600]".into(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.session_ttl,
        };

        let min_similarity = match trimmed(&lookup, "TALLY_MIN_SIMILARITY") {
            Some(raw) => {
                let score = raw.parse::<f32>().map_err(|_| {
                    Error::Validation("TALLY_MIN_SIMILARITY must be a number".into())
                })?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(Error::Validation(
                        "TALLY_MIN_SIMILARITY must be in [0.0, 1.0]".into(),
                    ));
                }
                score
            }
            None => defaults.min_similarity,
        };

        let max_suggestions = match trimmed(&lookup, "TALLY_MAX_SUGGESTIONS") {
            Some(raw) => {
                let count = raw.parse::<usize>().map_err(|_| {
                    Error::Validation("TALLY_MAX_SUGGESTIONS must be an integer".into())
                })?;
                if !(1..=20).contains(&count) {
                    return Err(Error::Validation(
                        "TALLY_MAX_SUGGESTIONS must be in [1, 20]".into(),
                    ));
                }
                count
            }
            None => defaults.max_suggestions,
        };

        Ok(Self {
            port,
            session_ttl,
            min_similarity,
            max_suggestions,
        })
    }

    /// Session lifetime in milliseconds
    pub const fn session_ttl_ms(&self) -> u64 {
        self.session_ttl.as_secs() * 1_000
    }
}

fn trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
