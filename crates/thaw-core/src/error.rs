//! Common error types shared across thaw crates.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A required field is empty.
    #[snafu(display("Job '{job}' has empty {field}"))]
    EmptyField { job: String, field: String },

    /// A job field holds a value outside its allowed range.
    #[snafu(display("Job '{job}' has invalid {field}: {message}"))]
    InvalidField {
        job: String,
        field: String,
        message: String,
    },

    /// An export job names neither or both of its locator inputs.
    #[snafu(display(
        "Job '{job}' must set exactly one of 'export_manifest' or 'export_prefix'"
    ))]
    ExportLocator { job: String },

    /// A job publishes to the catalog but no catalog section is configured.
    #[snafu(display("Job '{job}' publishes to the catalog but no 'catalog' section is configured"))]
    CatalogRequired { job: String },

    /// No jobs configured.
    #[snafu(display("No jobs configured"))]
    NoJobs,

    /// The job selected on the command line does not exist.
    #[snafu(display("Unknown job '{job}'"))]
    UnknownJob { job: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Duplicate job keys found across config files.
    #[snafu(display("Duplicate jobs: {}", keys.join(", ")))]
    DuplicateJobs { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}
