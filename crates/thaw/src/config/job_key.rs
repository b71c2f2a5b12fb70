//! Job identifier for thaw configurations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a job in a thaw configuration.
///
/// Job keys are the names under the top-level `jobs` map. They label every
/// log line and metric emitted by the job's run.
///
/// ```
/// use thaw::config::JobKey;
///
/// let key = JobKey::new("xo-hire-backup");
/// assert_eq!(key.id(), "xo-hire-backup");
/// ```
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Create a new job key from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier string.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
