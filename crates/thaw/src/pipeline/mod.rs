//! Job orchestration.
//!
//! A run walks the stages of one job strictly in order:
//!
//! 1. locate the newest snapshot (none found ends the run successfully)
//! 2. convert it through the bounded worker pool
//! 3. publish the converted tables to the catalog
//! 4. mirror staging into the target directory (backup jobs)
//! 5. reap the oldest output generation
//!
//! The first failing stage aborts the run; no later stage starts. Jobs are
//! independent of each other and run concurrently.

mod backup;
mod export;

use std::sync::Arc;

use snafu::prelude::*;
use tokio::task::JoinSet;
use tracing::{error, info};

use thaw_core::{StorageProvider, StorageProviderRef};

use crate::catalog::{CatalogRef, StorageCatalog};
use crate::config::{CatalogConfig, Config, JobConfig, JobKey};
use crate::engine::{ArrowEngine, TableEngineRef};
use crate::error::{PipelineError, StorageSnafu};
use crate::generation::GenerationToken;
use crate::mirror::MirrorSummary;
use crate::reaper::ReapOutcome;

/// What a completed run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Snapshot root (backup) or manifest key (export) that was converted.
    pub snapshot: String,
    /// Tables converted, sorted.
    pub tables: Vec<String>,
    pub records: u64,
    /// Keys of the part files written.
    pub files: Vec<String>,
    /// Catalog entries registered.
    pub published: usize,
    pub mirror: Option<MirrorSummary>,
    /// `None` when the run stopped before the reap stage had anything to do.
    pub reap: Option<ReapOutcome>,
}

/// Result of one successful job run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No snapshot exists yet; nothing was touched.
    NoSnapshot,
    Completed(RunSummary),
}

/// Everything one job run needs, built once per invocation.
#[derive(Clone)]
pub struct JobContext {
    pub key: JobKey,
    /// Provider rooted at the job's bucket.
    pub storage: StorageProviderRef,
    pub engine: TableEngineRef,
    pub catalog: Option<CatalogRef>,
    /// Token tagging every part file this run writes.
    pub generation: GenerationToken,
}

impl JobContext {
    /// Connect to the job's bucket with the Arrow engine and a fresh generation.
    pub async fn from_config(
        key: JobKey,
        job: &JobConfig,
        catalog: Option<CatalogRef>,
    ) -> Result<Self, PipelineError> {
        let options = match job {
            JobConfig::Backup(backup) => backup.storage_options.clone(),
            JobConfig::Export(export) => export.storage_options.clone(),
        };
        let storage = Arc::new(
            StorageProvider::for_url_with_options(job.bucket(), options)
                .await
                .context(StorageSnafu)?,
        );
        let engine: TableEngineRef = Arc::new(ArrowEngine::new(storage.clone(), key.id()));

        Ok(Self {
            key,
            storage,
            engine,
            catalog,
            generation: GenerationToken::now(),
        })
    }

    /// Replace the generation token.
    pub fn with_generation(mut self, generation: GenerationToken) -> Self {
        self.generation = generation;
        self
    }
}

/// Build the configured catalog, if any.
pub async fn build_catalog(
    config: Option<&CatalogConfig>,
) -> Result<Option<CatalogRef>, PipelineError> {
    let Some(config) = config else {
        return Ok(None);
    };

    let storage =
        StorageProvider::for_url_with_options(&config.uri, config.storage_options.clone())
            .await
            .context(StorageSnafu)?;
    info!(uri = %config.uri, "Using storage catalog");

    let catalog: CatalogRef = Arc::new(StorageCatalog::new(Arc::new(storage)));
    Ok(Some(catalog))
}

/// Run one job through every stage.
pub async fn run_job(ctx: &JobContext, job: &JobConfig) -> Result<RunOutcome, PipelineError> {
    info!(
        target = %ctx.key,
        kind = job.kind(),
        bucket = %job.bucket(),
        generation = %ctx.generation,
        "Starting job"
    );

    let outcome = match job {
        JobConfig::Backup(backup) => backup::run(ctx, backup).await?,
        JobConfig::Export(export) => export::run(ctx, export).await?,
    };

    match &outcome {
        RunOutcome::NoSnapshot => info!(target = %ctx.key, "No snapshot found, nothing to do"),
        RunOutcome::Completed(summary) => info!(
            target = %ctx.key,
            snapshot = %summary.snapshot,
            tables = summary.tables.len(),
            records = summary.records,
            files = summary.files.len(),
            published = summary.published,
            "Job completed"
        ),
    }
    Ok(outcome)
}

/// Outcome of every job of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<(JobKey, RunOutcome)>,
    pub failed: Vec<(JobKey, PipelineError)>,
    /// Job tasks that panicked.
    pub panicked: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.panicked == 0
    }
}

/// Run every configured job concurrently and wait for all of them.
///
/// Fails only when the shared catalog cannot be opened; job failures are
/// collected in the report.
pub async fn run_all(config: Config) -> Result<RunReport, PipelineError> {
    let mut report = RunReport::default();
    let catalog = build_catalog(config.catalog.as_ref()).await?;

    let mut handles: JoinSet<(JobKey, Result<RunOutcome, PipelineError>)> = JoinSet::new();
    for (key, job) in config.jobs {
        let catalog = catalog.clone();
        handles.spawn(async move {
            let result = match JobContext::from_config(key.clone(), &job, catalog).await {
                Ok(ctx) => run_job(&ctx, &job).await,
                Err(e) => Err(e),
            };
            (key, result)
        });
    }

    info!("Spawned {} job tasks", handles.len());

    while let Some(result) = handles.join_next().await {
        match result {
            Ok((key, Ok(outcome))) => report.completed.push((key, outcome)),
            Ok((key, Err(e))) => {
                error!(target = %key, error = %e, "Job failed");
                report.failed.push((key, e));
            }
            Err(e) => {
                error!(error = %e, "Job task panicked");
                report.panicked += 1;
            }
        }
    }

    report.completed.sort_by(|a, b| a.0.id().cmp(b.0.id()));
    report.failed.sort_by(|a, b| a.0.id().cmp(b.0.id()));
    info!(
        completed = report.completed.len(),
        failed = report.failed.len() + report.panicked,
        "All jobs finished"
    );
    Ok(report)
}
