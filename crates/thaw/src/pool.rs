//! Bounded-concurrency conversion of source objects into columnar output.
//!
//! Every job reads one source through the [`TableEngine`] and writes it to its
//! own destination. Jobs run at most `max_workers` at a time. A failing job
//! does not cancel its siblings; once all jobs have finished, every failure is
//! reported together and the pool run fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use thaw_core::emit;
use thaw_core::metrics::events::{ActiveConversions, ConversionCompleted, JobStatus};
use tracing::{error, info};

use crate::config::{DelimitedOptions, SemiStructuredFormat};
use crate::engine::{TableEngineRef, WriteRequest, WriteSummary};
use crate::error::{EngineError, JobFailure, PoolError};

/// Where a job reads its table from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Delimited text at a key or under a `/`-terminated prefix.
    Delimited {
        path: String,
        options: DelimitedOptions,
    },
    /// Newline-delimited records at a key or under a prefix.
    SemiStructured {
        path: String,
        format: SemiStructuredFormat,
    },
}

impl SourceSpec {
    pub fn path(&self) -> &str {
        match self {
            SourceSpec::Delimited { path, .. } | SourceSpec::SemiStructured { path, .. } => path,
        }
    }
}

/// One unit of conversion work.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    /// Table (or export) name, used in logs and failure reports.
    pub name: String,
    pub source: SourceSpec,
    pub request: WriteRequest,
}

/// Result of a successful job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub name: String,
    pub summary: WriteSummary,
    pub duration: Duration,
}

/// Fixed-width worker pool over a table engine.
pub struct ConversionWorkerPool {
    engine: TableEngineRef,
    max_workers: usize,
    /// Metrics label.
    target: String,
}

impl ConversionWorkerPool {
    pub fn new(engine: TableEngineRef, max_workers: usize, target: impl Into<String>) -> Self {
        Self {
            engine,
            max_workers: max_workers.max(1),
            target: target.into(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every job and wait for all of them.
    ///
    /// Reports are returned sorted by job name.
    pub async fn run(&self, jobs: Vec<ConversionJob>) -> Result<Vec<JobReport>, PoolError> {
        let total = jobs.len();
        info!(
            target = %self.target,
            jobs = total,
            max_workers = self.max_workers,
            "Launching conversion jobs"
        );

        let active = Arc::new(AtomicUsize::new(0));
        let results: Vec<Result<JobReport, JobFailure>> = stream::iter(jobs)
            .map(|job| self.run_job(job, active.clone()))
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        let mut reports = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.job.cmp(&b.job));
            return Err(PoolError { total, failures });
        }

        reports.sort_by(|a, b| a.name.cmp(&b.name));
        info!(
            target = %self.target,
            jobs = total,
            records = reports.iter().map(|r| r.summary.records).sum::<u64>(),
            files = reports.iter().map(|r| r.summary.files.len()).sum::<usize>(),
            "All conversion jobs completed"
        );
        Ok(reports)
    }

    async fn run_job(
        &self,
        job: ConversionJob,
        active: Arc<AtomicUsize>,
    ) -> Result<JobReport, JobFailure> {
        let count = active.fetch_add(1, Ordering::SeqCst) + 1;
        emit!(ActiveConversions {
            count,
            target: self.target.clone(),
        });

        let start = Instant::now();
        let result = self.convert(&job).await;
        let duration = start.elapsed();

        let count = active.fetch_sub(1, Ordering::SeqCst) - 1;
        emit!(ActiveConversions {
            count,
            target: self.target.clone(),
        });

        let status = if result.is_ok() {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        emit!(ConversionCompleted {
            status,
            duration,
            target: self.target.clone(),
        });

        match result {
            Ok(summary) => {
                info!(
                    target = %self.target,
                    job = %job.name,
                    source = job.source.path(),
                    destination = %job.request.path,
                    records = summary.records,
                    files = summary.files.len(),
                    elapsed_ms = duration.as_millis() as u64,
                    "Conversion job finished"
                );
                Ok(JobReport {
                    name: job.name,
                    summary,
                    duration,
                })
            }
            Err(error) => {
                error!(
                    target = %self.target,
                    job = %job.name,
                    source = job.source.path(),
                    error = %error,
                    "Conversion job failed"
                );
                Err(JobFailure {
                    job: job.name,
                    error,
                })
            }
        }
    }

    async fn convert(&self, job: &ConversionJob) -> Result<WriteSummary, EngineError> {
        let table = match &job.source {
            SourceSpec::Delimited { path, options } => {
                self.engine.read_delimited(path, options).await?
            }
            SourceSpec::SemiStructured { path, format } => {
                self.engine.read_semi_structured(path, *format).await?
            }
        };
        self.engine.write(table, &job.request).await
    }
}
