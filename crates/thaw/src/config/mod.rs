//! Configuration for thaw ingestion jobs.
//!
//! # Example
//!
//! ```yaml
//! catalog:
//!   uri: s3://xo-hire-catalog
//!
//! jobs:
//!   xo-hire-backup:
//!     kind: backup
//!     bucket: s3://xo-hire-backups
//!     source_prefix: exports/
//!     target_dir: athena
//!     database: xo_hire
//!
//!   interview-bot:
//!     kind: export
//!     bucket: s3://xo-hire-exports
//!     export_prefix: dynamodb-export/interview-bot/AWSDynamoDB/
//!     database: xo_hire
//!     table: interview_bot
//! ```

mod job_key;
mod loader;

pub use job_key::JobKey;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::naming::is_valid_identifier;
pub use thaw_core::config::{ConfigPath, ParquetCompression, interpolate};

/// Catalog location shared by every publishing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// URI under which catalog entries are stored (supports S3, GCS, local).
    pub uri: String,
    /// Storage options for the catalog location (credentials, region, etc.).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Options for reading delimited text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimitedOptions {
    pub delimiter: char,
    pub quote: char,
    /// Escape character inside quoted fields. `None` means doubled quotes.
    pub escape: Option<char>,
    /// Whether the first line holds column names.
    pub header: bool,
    /// Infer column types; when disabled every column is read as a string.
    pub infer_schema: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            escape: None,
            header: true,
            infer_schema: true,
        }
    }
}

/// Encoding of semi-structured export data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemiStructuredFormat {
    /// Newline-delimited plain JSON objects.
    #[serde(rename = "json")]
    Json,
    /// Newline-delimited DynamoDB JSON (`{"Item": {"attr": {"S": "..."}}}`).
    #[default]
    #[serde(rename = "dynamodb_json")]
    DynamoDbJson,
}

/// Columnar output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Parquet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Output settings for converted data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub compression: ParquetCompression,
    /// Target part file size in MB.
    #[serde(default = "default_file_size_mb")]
    pub file_size_mb: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            compression: ParquetCompression::default(),
            file_size_mb: default_file_size_mb(),
        }
    }
}

fn default_file_size_mb() -> usize {
    128
}

fn default_max_workers() -> usize {
    20
}

fn default_staging_dir() -> String {
    "thawtempdir".to_string()
}

fn default_file_suffix() -> String {
    ".csv.gz".to_string()
}

/// A database backup: one delimited file per table under dated snapshot prefixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJobConfig {
    /// Bucket URL (supports S3, GCS, local).
    pub bucket: String,
    /// Prefix whose immediate children are the snapshot roots.
    pub source_prefix: String,
    /// Directory that holds one sub-directory per converted table.
    pub target_dir: String,
    /// Scratch directory. Each job stages under `<staging_dir>/<job>/`, which is
    /// cleared at the start of every run.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Suffix of the backup files to convert.
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    /// Database to register converted tables in. Tables are not published when unset.
    #[serde(default)]
    pub database: Option<String>,
    /// Maximum concurrent conversions.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub csv: DelimitedOptions,
    #[serde(default)]
    pub output: OutputConfig,
    /// Storage options for the bucket (credentials, region, etc.).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// A change export: a manifest-addressed dump of one key-value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJobConfig {
    /// Bucket URL (supports S3, GCS, local).
    pub bucket: String,
    /// Key of a specific `manifest-summary.json`.
    #[serde(default)]
    pub export_manifest: Option<String>,
    /// Prefix whose newest child is the export to convert.
    #[serde(default)]
    pub export_prefix: Option<String>,
    /// Where generations are written. Defaults to `<first two manifest segments>/catalog-data/`.
    #[serde(default)]
    pub output_prefix: Option<String>,
    pub database: String,
    pub table: String,
    #[serde(default)]
    pub format: SemiStructuredFormat,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// A single named job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobConfig {
    Backup(BackupJobConfig),
    Export(ExportJobConfig),
}

impl JobConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            JobConfig::Backup(_) => "backup",
            JobConfig::Export(_) => "export",
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            JobConfig::Backup(job) => &job.bucket,
            JobConfig::Export(job) => &job.bucket,
        }
    }

    fn publishes(&self) -> bool {
        match self {
            JobConfig::Backup(job) => job.database.is_some(),
            JobConfig::Export(_) => true,
        }
    }
}

/// Main configuration for thaw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Catalog used by jobs that publish tables.
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
    /// Named job configurations, in file order.
    #[serde(default)]
    pub jobs: IndexMap<JobKey, JobConfig>,
}

impl Config {
    /// Load configuration from multiple paths (files or directories).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config = loader::load_from_paths(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_unvalidated(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_unvalidated(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        serde_yaml::from_str(&result.text).map_err(|source| ConfigError::YamlParse { source })
    }

    /// Merge jobs from another file. A catalog section in `other` replaces this one.
    fn merge(&mut self, other: Self) -> Result<(), ConfigError> {
        let duplicates: Vec<String> = other
            .jobs
            .keys()
            .filter(|key| self.jobs.contains_key(*key))
            .map(ToString::to_string)
            .collect();

        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateJobs { keys: duplicates });
        }

        self.jobs.extend(other.jobs);
        if other.catalog.is_some() {
            self.catalog = other.catalog;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }

        for (key, job) in &self.jobs {
            let name = key.id();
            match job {
                JobConfig::Backup(backup) => validate_backup(name, backup)?,
                JobConfig::Export(export) => validate_export(name, export)?,
            }

            if job.publishes() && self.catalog.is_none() {
                return Err(ConfigError::CatalogRequired {
                    job: name.to_string(),
                });
            }
        }

        validate_backup_layout(&self.jobs)?;

        if let Some(catalog) = &self.catalog {
            require_non_empty("catalog", "uri", &catalog.uri)?;
        }

        Ok(())
    }

    /// Iterate over all jobs with their keys.
    pub fn jobs(&self) -> impl Iterator<Item = (&JobKey, &JobConfig)> {
        self.jobs.iter()
    }

    /// Get the number of jobs in the configuration.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Restrict the configuration to a single job.
    pub fn select(&mut self, job: &str) -> Result<(), ConfigError> {
        let key = JobKey::new(job);
        let Some(selected) = self.jobs.shift_remove(&key) else {
            return Err(ConfigError::UnknownJob {
                job: job.to_string(),
            });
        };
        self.jobs = IndexMap::from([(key, selected)]);
        Ok(())
    }
}

fn require_non_empty(job: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField {
            job: job.to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn invalid(job: &str, field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        job: job.to_string(),
        field: field.to_string(),
        message: message.into(),
    }
}

fn validate_identifier(job: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    require_non_empty(job, field, value)?;
    if !is_valid_identifier(value) {
        return Err(invalid(job, field, "only [A-Za-z0-9_] is allowed"));
    }
    Ok(())
}

fn validate_workers(job: &str, max_workers: usize) -> Result<(), ConfigError> {
    if max_workers == 0 {
        return Err(invalid(job, "max_workers", "must be at least 1"));
    }
    Ok(())
}

fn validate_output(job: &str, output: &OutputConfig) -> Result<(), ConfigError> {
    if output.file_size_mb == 0 {
        return Err(invalid(job, "output.file_size_mb", "must be at least 1"));
    }
    Ok(())
}

/// Whether one directory contains the other.
fn overlaps(a: &str, b: &str) -> bool {
    let (a, b) = (
        format!("{}/", a.trim_matches('/')),
        format!("{}/", b.trim_matches('/')),
    );
    a.starts_with(&b) || b.starts_with(&a)
}

/// Backup jobs in one bucket mirror with delete, so none may write into
/// another's target or staging directory.
fn validate_backup_layout(jobs: &IndexMap<JobKey, JobConfig>) -> Result<(), ConfigError> {
    let backups: Vec<(&JobKey, &BackupJobConfig)> = jobs
        .iter()
        .filter_map(|(key, job)| match job {
            JobConfig::Backup(backup) => Some((key, backup)),
            JobConfig::Export(_) => None,
        })
        .collect();

    for (key, job) in &backups {
        for (other_key, other) in &backups {
            if key == other_key || job.bucket != other.bucket {
                continue;
            }
            if overlaps(&job.target_dir, &other.target_dir) {
                return Err(invalid(
                    key.id(),
                    "target_dir",
                    format!("overlaps target_dir of job '{other_key}'"),
                ));
            }
            if overlaps(&job.target_dir, &other.staging_dir) {
                return Err(invalid(
                    key.id(),
                    "target_dir",
                    format!("overlaps staging_dir of job '{other_key}'"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_backup(job: &str, config: &BackupJobConfig) -> Result<(), ConfigError> {
    require_non_empty(job, "bucket", &config.bucket)?;
    require_non_empty(job, "source_prefix", &config.source_prefix)?;
    require_non_empty(job, "target_dir", &config.target_dir)?;
    require_non_empty(job, "staging_dir", &config.staging_dir)?;
    require_non_empty(job, "file_suffix", &config.file_suffix)?;
    validate_workers(job, config.max_workers)?;
    validate_output(job, &config.output)?;

    if let Some(database) = &config.database {
        validate_identifier(job, "database", database)?;
    }

    if overlaps(&config.staging_dir, &config.target_dir) {
        return Err(invalid(
            job,
            "staging_dir",
            "must not overlap with target_dir",
        ));
    }

    let csv = &config.csv;
    for (field, value) in [
        ("csv.delimiter", Some(csv.delimiter)),
        ("csv.quote", Some(csv.quote)),
        ("csv.escape", csv.escape),
    ] {
        if value.is_some_and(|c| !c.is_ascii()) {
            return Err(invalid(job, field, "must be a single ASCII character"));
        }
    }

    Ok(())
}

fn validate_export(job: &str, config: &ExportJobConfig) -> Result<(), ConfigError> {
    require_non_empty(job, "bucket", &config.bucket)?;

    match (&config.export_manifest, &config.export_prefix) {
        (Some(manifest), None) => require_non_empty(job, "export_manifest", manifest)?,
        (None, Some(prefix)) => require_non_empty(job, "export_prefix", prefix)?,
        _ => {
            return Err(ConfigError::ExportLocator {
                job: job.to_string(),
            });
        }
    }

    if let Some(output_prefix) = &config.output_prefix {
        require_non_empty(job, "output_prefix", output_prefix)?;
    }

    validate_identifier(job, "database", &config.database)?;
    validate_identifier(job, "table", &config.table)?;
    validate_workers(job, config.max_workers)?;
    validate_output(job, &config.output)
}
