//! Export jobs: one change export appended as a new generation of a single
//! catalogued table.

use snafu::prelude::*;
use thaw_core::MB;
use thaw_core::emit;
use thaw_core::metrics::events::ObjectsDiscovered;
use tracing::{info, warn};

use super::{JobContext, RunOutcome, RunSummary};
use crate::catalog::CatalogPublisher;
use crate::config::ExportJobConfig;
use crate::engine::{WriteMode, WriteRequest};
use crate::error::{ConfigError, InvalidManifestSnafu, LocateSnafu, PipelineError};
use crate::pool::{ConversionJob, ConversionWorkerPool, SourceSpec};
use crate::reaper::GenerationReaper;
use crate::snapshot::{ExportSnapshot, locate_export};

async fn locate(
    ctx: &JobContext,
    job: &ExportJobConfig,
) -> Result<Option<ExportSnapshot>, PipelineError> {
    match (&job.export_manifest, &job.export_prefix) {
        (Some(manifest), _) => {
            let snapshot =
                ExportSnapshot::from_manifest(manifest).context(InvalidManifestSnafu {
                    key: manifest.as_str(),
                })?;
            Ok(Some(snapshot))
        }
        (None, Some(prefix)) => Ok(locate_export(&ctx.storage, prefix)
            .await
            .context(LocateSnafu { prefix })?),
        (None, None) => Err(ConfigError::ExportLocator {
            job: ctx.key.to_string(),
        }
        .into()),
    }
}

pub(super) async fn run(
    ctx: &JobContext,
    job: &ExportJobConfig,
) -> Result<RunOutcome, PipelineError> {
    let storage = ctx.storage.as_ref();

    let Some(snapshot) = locate(ctx, job).await? else {
        return Ok(RunOutcome::NoSnapshot);
    };

    let output_prefix = match &job.output_prefix {
        Some(prefix) => format!("{}/", prefix.trim_end_matches('/')),
        None => snapshot
            .default_output_prefix()
            .context(InvalidManifestSnafu {
                key: snapshot.manifest.as_str(),
            })?,
    };
    info!(
        target = %ctx.key,
        manifest = %snapshot.manifest,
        data = %snapshot.data_prefix,
        output = %output_prefix,
        "Located export"
    );

    let objects = storage.list_keys(&snapshot.data_prefix).await?;
    emit!(ObjectsDiscovered {
        count: objects.len() as u64,
        target: ctx.key.to_string(),
    });
    if objects.is_empty() {
        warn!(
            target = %ctx.key,
            data = %snapshot.data_prefix,
            "Export has no data objects"
        );
    }

    let conversion = ConversionJob {
        name: job.table.clone(),
        source: SourceSpec::SemiStructured {
            path: snapshot.data_prefix.clone(),
            format: job.format,
        },
        request: WriteRequest {
            path: output_prefix.clone(),
            format: job.output.format,
            compression: job.output.compression,
            mode: WriteMode::Append,
            generation: ctx.generation.clone(),
            target_file_size: job.output.file_size_mb * MB,
        },
    };

    let pool = ConversionWorkerPool::new(ctx.engine.clone(), job.max_workers, ctx.key.id());
    let reports = pool.run(vec![conversion]).await?;

    let published = match &ctx.catalog {
        Some(catalog) => {
            CatalogPublisher::new(catalog.clone(), ctx.key.id())
                .publish(
                    &job.database,
                    &job.table,
                    &storage.location_url(&output_prefix),
                    job.output.format,
                    job.output.compression,
                    Some(&ctx.generation),
                )
                .await?;
            1
        }
        None => {
            warn!(target = %ctx.key, "No catalog configured, skipping publish");
            0
        }
    };

    let reap = GenerationReaper::new(storage, ctx.key.id())
        .reap(&output_prefix)
        .await?;

    Ok(RunOutcome::Completed(RunSummary {
        snapshot: snapshot.manifest,
        tables: vec![job.table.clone()],
        records: reports.iter().map(|r| r.summary.records).sum(),
        files: reports
            .into_iter()
            .flat_map(|report| report.summary.files)
            .collect(),
        published,
        mirror: None,
        reap: Some(reap),
    }))
}
