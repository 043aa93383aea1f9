//! File configuration.
//!
//! Every field has a default, unknown fields are rejected:
//!
//! ```toml
//! name = "orders"
//! addr = "0.0.0.0:8080"
//! error_policy = "terse"      # or "verbose" (default)
//! request_timeout_ms = 5000   # optional and non-zero, no timeout when absent
//! log_requests = true
//! recover_panics = true
//! ```

use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::Result;

/// Which built-in error handler to install.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// [`error_handler::verbose`](crate::error_handler::verbose)
    #[default]
    Verbose,
    /// [`error_handler::terse`](crate::error_handler::terse)
    Terse,
}

/// Application configuration, see the [module docs](self) for the format.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub name: String,
    pub addr: String,
    pub error_policy: ErrorPolicy,
    #[serde(deserialize_with = "non_zero_ms")]
    pub request_timeout_ms: Option<u64>,
    pub log_requests: bool,
    pub recover_panics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "keel".to_owned(),
            addr: "0.0.0.0:8080".to_owned(),
            error_policy: ErrorPolicy::Verbose,
            request_timeout_ms: None,
            log_requests: true,
            recover_panics: true,
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }
}

fn non_zero_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<u64>::deserialize(deserializer)? {
        Some(0) => Err(D::Error::custom("request_timeout_ms must be greater than zero")),
        ms => Ok(ms),
    }
}
