//! Removal of superseded output generations.
//!
//! Output keys are grouped by the generation token embedded in their part
//! file name. With two or more generations present the oldest one is
//! deleted; one generation is never touched, whatever its age.
//!
//! Exactly one generation is removed per run. A backlog left by skipped runs
//! shrinks by one generation on every later run.

use std::collections::BTreeMap;

use snafu::prelude::*;
use thaw_core::StorageProvider;
use thaw_core::emit;
use thaw_core::metrics::events::{GenerationsFound, ObjectsDeleted};
use tracing::info;

use crate::error::{ReapDeleteSnafu, ReapError, ReapListSnafu};
use crate::generation::{GenerationToken, extract_generation};

/// Output keys grouped by generation, oldest first.
pub type GenerationGroups = BTreeMap<GenerationToken, Vec<String>>;

/// Group keys by their generation token. Keys without one are skipped.
pub fn group_generations<I, S>(keys: I) -> GenerationGroups
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut groups = GenerationGroups::new();
    for key in keys {
        let key = key.into();
        if let Some(token) = extract_generation(&key) {
            groups.entry(token).or_default().push(key);
        }
    }
    groups
}

/// What a reap decided and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// No generation found under the prefix.
    NothingToClean {
        /// Objects listed, including ones without a generation.
        objects: usize,
    },
    /// A single generation exists; it is kept.
    FirstRun { generation: GenerationToken },
    /// The oldest generation was deleted.
    Reaped {
        generation: GenerationToken,
        deleted: u64,
        /// Generations left after the reap.
        remaining: usize,
    },
}

/// Decide which generation to delete, if any.
///
/// Returns the oldest group when at least two groups exist.
pub fn oldest_superseded(groups: &GenerationGroups) -> Option<(&GenerationToken, &Vec<String>)> {
    if groups.len() < 2 {
        return None;
    }
    groups.first_key_value()
}

/// Reaps one output prefix.
pub struct GenerationReaper<'a> {
    storage: &'a StorageProvider,
    /// Metrics label.
    target: String,
}

impl<'a> GenerationReaper<'a> {
    pub fn new(storage: &'a StorageProvider, target: impl Into<String>) -> Self {
        Self {
            storage,
            target: target.into(),
        }
    }

    /// Delete the oldest generation under `prefix` if a newer one exists.
    pub async fn reap(&self, prefix: &str) -> Result<ReapOutcome, ReapError> {
        let keys = self
            .storage
            .list_keys(prefix)
            .await
            .context(ReapListSnafu { prefix })?;
        let objects = keys.len();
        let groups = group_generations(keys);

        emit!(GenerationsFound {
            count: groups.len(),
            target: self.target.clone(),
        });
        info!(
            target = %self.target,
            prefix,
            objects,
            generations = groups.len(),
            "Listed output generations"
        );

        let Some((oldest, doomed)) = oldest_superseded(&groups) else {
            return Ok(match groups.keys().next().cloned() {
                None => {
                    info!(target = %self.target, prefix, "Nothing to clean");
                    ReapOutcome::NothingToClean { objects }
                }
                Some(generation) => {
                    info!(
                        target = %self.target,
                        prefix,
                        generation = %generation,
                        "First run, skipping cleanup"
                    );
                    ReapOutcome::FirstRun { generation }
                }
            });
        };

        let deleted = self
            .storage
            .delete_keys(doomed)
            .await
            .context(ReapDeleteSnafu {
                generation: oldest.as_str(),
            })?;

        emit!(ObjectsDeleted {
            count: deleted,
            target: self.target.clone(),
        });
        info!(
            target = %self.target,
            prefix,
            generation = %oldest,
            deleted,
            "Deleted oldest generation"
        );

        Ok(ReapOutcome::Reaped {
            generation: oldest.clone(),
            deleted,
            remaining: groups.len() - 1,
        })
    }
}
