//! Backup jobs: one delimited file per table, converted under staging and
//! mirrored into the target directory.

use std::collections::BTreeMap;

use snafu::prelude::*;
use thaw_core::MB;
use thaw_core::emit;
use thaw_core::metrics::events::ObjectsDiscovered;
use tracing::{debug, info, warn};

use super::{JobContext, RunOutcome, RunSummary};
use crate::catalog::CatalogPublisher;
use crate::config::BackupJobConfig;
use crate::engine::{WriteMode, WriteRequest};
use crate::error::{DuplicateTableSnafu, LocateSnafu, MirrorSnafu, PipelineError};
use crate::mirror::mirror;
use crate::naming::table_name;
use crate::pool::{ConversionJob, ConversionWorkerPool, SourceSpec};
use crate::reaper::GenerationReaper;
use crate::snapshot::locate_latest;

fn as_dir(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

/// Map source keys to table names, rejecting two keys for one table.
///
/// Keys whose name resolves to nothing are skipped.
pub(crate) fn resolve_tables(
    keys: &[String],
    suffix: &str,
) -> Result<BTreeMap<String, String>, PipelineError> {
    let mut tables: BTreeMap<String, String> = BTreeMap::new();
    for key in keys {
        let Some(table) = table_name(key, suffix) else {
            warn!(key = %key, "Skipping object without a usable table name");
            continue;
        };
        if let Some(first) = tables.get(&table) {
            return DuplicateTableSnafu {
                table,
                first: first.as_str(),
                second: key.as_str(),
            }
            .fail();
        }
        tables.insert(table, key.clone());
    }
    Ok(tables)
}

pub(super) async fn run(
    ctx: &JobContext,
    job: &BackupJobConfig,
) -> Result<RunOutcome, PipelineError> {
    let storage = ctx.storage.as_ref();

    let Some(snapshot) = locate_latest(storage, &job.source_prefix)
        .await
        .context(LocateSnafu {
            prefix: &job.source_prefix,
        })?
    else {
        return Ok(RunOutcome::NoSnapshot);
    };
    info!(target = %ctx.key, snapshot = %snapshot, "Located newest snapshot");

    let objects: Vec<String> = storage
        .list_keys(&snapshot)
        .await?
        .into_iter()
        .filter(|key| key.ends_with(&job.file_suffix))
        .collect();
    emit!(ObjectsDiscovered {
        count: objects.len() as u64,
        target: ctx.key.to_string(),
    });
    info!(
        target = %ctx.key,
        snapshot = %snapshot,
        objects = objects.len(),
        suffix = %job.file_suffix,
        "Listed snapshot objects"
    );

    let tables = resolve_tables(&objects, &job.file_suffix)?;
    if tables.is_empty() {
        warn!(
            target = %ctx.key,
            snapshot = %snapshot,
            "Snapshot holds no convertible objects, leaving staging and target untouched"
        );
        return Ok(RunOutcome::Completed(RunSummary {
            snapshot,
            tables: Vec::new(),
            records: 0,
            files: Vec::new(),
            published: 0,
            mirror: None,
            reap: None,
        }));
    }

    // Jobs sharing a staging directory each get their own subdirectory.
    let staging = format!("{}{}/", as_dir(&job.staging_dir), ctx.key.id());
    let target_dir = as_dir(&job.target_dir);

    let cleared = storage.delete_prefix(&staging).await?;
    debug!(target = %ctx.key, staging = %staging, cleared, "Cleared staging directory");

    let jobs: Vec<ConversionJob> = tables
        .iter()
        .map(|(table, key)| ConversionJob {
            name: table.clone(),
            source: SourceSpec::Delimited {
                path: key.clone(),
                options: job.csv.clone(),
            },
            request: WriteRequest {
                path: format!("{staging}{table}/"),
                format: job.output.format,
                compression: job.output.compression,
                mode: WriteMode::Overwrite,
                generation: ctx.generation.clone(),
                target_file_size: job.output.file_size_mb * MB,
            },
        })
        .collect();

    let pool = ConversionWorkerPool::new(ctx.engine.clone(), job.max_workers, ctx.key.id());
    let reports = pool.run(jobs).await?;

    let mut published = 0;
    if let Some(database) = &job.database {
        match &ctx.catalog {
            Some(catalog) => {
                let publisher = CatalogPublisher::new(catalog.clone(), ctx.key.id());
                for table in tables.keys() {
                    let location = storage.location_url(&format!("{target_dir}{table}/"));
                    publisher
                        .publish(
                            database,
                            table,
                            &location,
                            job.output.format,
                            job.output.compression,
                            Some(&ctx.generation),
                        )
                        .await?;
                    published += 1;
                }
            }
            None => warn!(
                target = %ctx.key,
                database = %database,
                "No catalog configured, skipping publish"
            ),
        }
    }

    let mirrored = mirror(storage, &staging, &target_dir, ctx.key.id())
        .await
        .context(MirrorSnafu {
            from: &staging,
            to: &target_dir,
        })?;

    let reap = GenerationReaper::new(storage, ctx.key.id())
        .reap(&target_dir)
        .await?;

    // Staged part files move to the target directory under the same relative name.
    let files = reports
        .iter()
        .flat_map(|report| report.summary.files.iter())
        .map(|key| match key.strip_prefix(&staging) {
            Some(relative) => format!("{target_dir}{relative}"),
            None => key.clone(),
        })
        .collect();

    Ok(RunOutcome::Completed(RunSummary {
        snapshot,
        tables: tables.into_keys().collect(),
        records: reports.iter().map(|r| r.summary.records).sum(),
        files,
        published,
        mirror: Some(mirrored),
        reap: Some(reap),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("backup/run-1/{n}")).collect()
    }

    #[test]
    fn test_resolve_tables() {
        let tables = resolve_tables(
            &keys(&["companies.csv.gz", "jobs.csv.gz", ".csv.gz"]),
            ".csv.gz",
        )
        .unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables["company"], "backup/run-1/companies.csv.gz");
        assert_eq!(tables["job"], "backup/run-1/jobs.csv.gz");
    }

    #[test]
    fn test_duplicate_table_names_fail() {
        let err = resolve_tables(&keys(&["job.csv.gz", "jobs.csv.gz"]), ".csv.gz").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DuplicateTable { ref table, .. } if table == "job"
        ));
    }
}
