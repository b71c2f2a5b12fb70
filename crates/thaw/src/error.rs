//! Error types for the thaw ingestion pipeline.

use snafu::prelude::*;

pub use thaw_core::error::{ConfigError, StorageError};

/// A DynamoDB JSON record that does not follow the typed attribute encoding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FlattenError {
    #[snafu(display("record is not a JSON object"))]
    NotAnObject,

    #[snafu(display("'Item' is not a JSON object"))]
    ItemNotAnObject,

    #[snafu(display("attribute '{name}': {source}"))]
    Attribute {
        name: String,
        #[snafu(source(from(FlattenError, Box::new)))]
        source: Box<FlattenError>,
    },

    #[snafu(display("expected a typed attribute, found {found}"))]
    Untyped { found: String },

    #[snafu(display("expected exactly one type descriptor, found {count}"))]
    DescriptorCount { count: usize },

    #[snafu(display("expected {kind} set member, found {found}"))]
    SetMember { kind: String, found: String },

    #[snafu(display("unsupported type descriptor '{descriptor}' with value {value}"))]
    UnsupportedType { descriptor: String, value: String },
}

/// Errors raised by the tabular read/write engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// Failed to fetch or store an object.
    #[snafu(display("Storage error for {path}: {source}"))]
    EngineStorage { path: String, source: StorageError },

    /// Failed to decompress a source object.
    #[snafu(display("Failed to decompress {path}: {source}"))]
    Decompress {
        path: String,
        source: std::io::Error,
    },

    /// Failed to infer a schema or decode delimited text.
    #[snafu(display("Failed to read delimited data from {path}: {source}"))]
    Delimited {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// A semi-structured record is not valid JSON.
    #[snafu(display("Invalid JSON in {path} at line {line}: {source}"))]
    JsonParse {
        path: String,
        line: usize,
        source: serde_json::Error,
    },

    /// A record does not follow the expected nested encoding.
    #[snafu(display("Malformed record in {path} at line {line}: {message}"))]
    MalformedRecord {
        path: String,
        line: usize,
        message: String,
    },

    /// A DynamoDB JSON record could not be flattened.
    #[snafu(display("Malformed record in {path} at line {line}: {source}"))]
    Flatten {
        path: String,
        line: usize,
        source: FlattenError,
    },

    /// Failed to build record batches from decoded JSON.
    #[snafu(display("Failed to decode JSON records from {path}: {source}"))]
    JsonDecode {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// Tables read from one prefix disagree on their schema.
    #[snafu(display("Schema mismatch under {path}: {source}"))]
    SchemaMerge {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// A source decoded to a table without columns and would replace existing output.
    #[snafu(display("Source for {path} has no columns, refusing to overwrite"))]
    EmptyTable { path: String },

    /// Failed to encode a Parquet file.
    #[snafu(display("Failed to write Parquet for {path}: {source}"))]
    ParquetWrite {
        path: String,
        source: parquet::errors::ParquetError,
    },

    /// Blocking conversion task panicked or was cancelled.
    #[snafu(display("Conversion task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

/// One failed conversion job.
#[derive(Debug)]
pub struct JobFailure {
    /// Name of the table (or export) the job was converting.
    pub job: String,
    pub error: EngineError,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.job, self.error)
    }
}

/// Conversion stage failure, aggregated over every failed job.
#[derive(Debug, Snafu)]
#[snafu(display(
    "{} of {total} conversion job(s) failed: {}",
    failures.len(),
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
))]
pub struct PoolError {
    pub total: usize,
    pub failures: Vec<JobFailure>,
}

/// Errors raised by catalog implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CatalogError {
    /// Database or table name is not a valid catalog identifier.
    #[snafu(display("Invalid catalog identifier '{value}': only [A-Za-z0-9_] is allowed"))]
    InvalidIdentifier { value: String },

    /// Failed to read or write the catalog document.
    #[snafu(display("Catalog storage error for {key}: {source}"))]
    CatalogStorage { key: String, source: StorageError },

    /// Failed to serialize a catalog entry.
    #[snafu(display("Failed to serialize catalog entry {key}: {source}"))]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    /// Stored catalog document is not a valid entry.
    #[snafu(display("Failed to parse catalog entry {key}: {source}"))]
    Deserialize {
        key: String,
        source: serde_json::Error,
    },
}

/// Errors raised while reaping superseded generations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReapError {
    /// Failed to list the output prefix.
    #[snafu(display("Failed to list {prefix}: {source}"))]
    ReapList { prefix: String, source: StorageError },

    /// Failed to delete a superseded generation.
    #[snafu(display("Failed to delete generation {generation}: {source}"))]
    ReapDelete {
        generation: String,
        source: StorageError,
    },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error outside of a specific stage.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Failed to locate the newest snapshot.
    #[snafu(display("Failed to locate snapshot under {prefix}: {source}"))]
    Locate { prefix: String, source: StorageError },

    /// Manifest key does not have the `<root>/<source>/.../manifest-summary.json` shape.
    #[snafu(display("Invalid export manifest key '{key}'"))]
    InvalidManifest { key: String },

    /// Two source objects resolve to the same table.
    #[snafu(display("Table '{table}' is produced by both {first} and {second}"))]
    DuplicateTable {
        table: String,
        first: String,
        second: String,
    },

    /// At least one conversion job failed.
    #[snafu(display("Conversion failed: {source}"))]
    Conversion { source: PoolError },

    /// Catalog registration failed.
    #[snafu(display("Publish failed: {source}"))]
    Publish { source: CatalogError },

    /// Mirroring staging into the target directory failed.
    #[snafu(display("Mirror from {from} to {to} failed: {source}"))]
    Mirror {
        from: String,
        to: String,
        source: StorageError,
    },

    /// Reaping the oldest generation failed.
    #[snafu(display("Reap failed: {source}"))]
    Reap { source: ReapError },
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<PoolError> for PipelineError {
    fn from(source: PoolError) -> Self {
        PipelineError::Conversion { source }
    }
}

impl From<CatalogError> for PipelineError {
    fn from(source: CatalogError) -> Self {
        PipelineError::Publish { source }
    }
}

impl From<ReapError> for PipelineError {
    fn from(source: ReapError) -> Self {
        PipelineError::Reap { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_lists_every_failure() {
        let err = PoolError {
            total: 3,
            failures: vec![
                JobFailure {
                    job: "company".into(),
                    error: EngineError::MalformedRecord {
                        path: "a".into(),
                        line: 1,
                        message: "bad".into(),
                    },
                },
                JobFailure {
                    job: "job".into(),
                    error: EngineError::MalformedRecord {
                        path: "b".into(),
                        line: 2,
                        message: "worse".into(),
                    },
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("2 of 3 conversion job(s) failed"));
        assert!(message.contains("company: Malformed record in a at line 1: bad"));
        assert!(message.contains("job: Malformed record"));
    }
}
