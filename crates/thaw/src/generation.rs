//! Generation tokens and part file naming.
//!
//! Every conversion run tags the part files it writes with one token:
//! `run-<token>-part-block-<n>-<codec>.parquet`. The token is what the
//! reaper groups output keys by.

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static GENERATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"run-(?P<token>[A-Za-z0-9]+)-part-block").expect("Invalid regex pattern")
});

/// Opaque, string-ordered identifier of one output generation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationToken(String);

impl GenerationToken {
    /// Wrap an explicit token. Tokens must be alphanumeric to be recognised
    /// by [`extract_generation`].
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token for a run starting now: 13-digit zero-padded epoch milliseconds,
    /// so later runs sort after earlier ones.
    pub fn now() -> Self {
        Self(format!("{:013}", Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File name of the `block`-th part file of a generation.
pub fn part_file_name(generation: &GenerationToken, block: usize, codec: &str) -> String {
    format!("run-{generation}-part-block-{block:05}-{codec}.parquet")
}

/// Extract the generation token embedded in an output key, if any.
pub fn extract_generation(key: &str) -> Option<GenerationToken> {
    GENERATION_PATTERN
        .captures(key)
        .map(|caps| GenerationToken::new(&caps["token"]))
}
