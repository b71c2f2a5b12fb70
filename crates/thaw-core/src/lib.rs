//! thaw-core: Shared components for the thaw ingestion pipeline.
//!
//! - `storage/` - Object storage abstraction (S3, GCS, local)
//! - `metrics/` - Internal metric events and the `emit!` macro
//! - `config/` - Environment variable interpolation, CLI arguments, shared enums
//! - `signal` - Signal handling for interrupting a run
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod storage;
pub mod tracing;

pub use config::{CliArgs, ConfigPath, KB, MB, ParquetCompression};
pub use error::{ConfigError, StorageError};
pub use signal::shutdown_signal;
pub use storage::{StorageProvider, StorageProviderRef};
pub use tracing::init_tracing;
