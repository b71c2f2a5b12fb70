//! Thaw: converts snapshot exports in object storage into catalogued Parquet.
//!
//! This crate handles:
//! - Locating the newest backup snapshot or change export under a prefix
//! - Converting delimited and DynamoDB JSON sources to Parquet with a bounded worker pool
//! - Registering the converted tables in a catalog
//! - Mirroring staged output into the target directory
//! - Reaping superseded output generations

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod mirror;
pub mod naming;
pub mod pipeline;
pub mod pool;
pub mod reaper;
pub mod snapshot;

// Re-export commonly used items
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{JobContext, RunOutcome, RunReport, RunSummary, run_all, run_job};

// Re-export from thaw-core
pub use thaw_core::{
    CliArgs, KB, MB, ParquetCompression, StorageProvider, StorageProviderRef, init_tracing,
    shutdown_signal,
};
