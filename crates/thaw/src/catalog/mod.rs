//! Catalog registration of converted tables.
//!
//! A catalog maps `database.table` to the location and encoding of its data.
//! Registration replaces any existing entry (last writer wins, no versions).
//!
//! - [`StorageCatalog`] keeps one JSON document per table in object storage.
//! - [`MemoryCatalog`] keeps entries in process, for tests and dry runs.

mod storage;

pub use storage::StorageCatalog;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thaw_core::emit;
use thaw_core::metrics::events::CatalogEntryPublished;
use tracing::info;

use crate::config::{OutputFormat, ParquetCompression};
use crate::error::CatalogError;
use crate::generation::GenerationToken;
use crate::naming::is_valid_identifier;

/// Registration of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub database: String,
    pub table: String,
    /// Canonical URL of the directory holding the table's data.
    pub location: String,
    pub format: OutputFormat,
    pub compression: ParquetCompression,
    /// Generation written by the run that registered this entry.
    #[serde(default)]
    pub generation: Option<GenerationToken>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// `database.table`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

/// Register-or-replace capability of a catalog service.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create the entry, or replace the existing one for the same table.
    async fn register_or_update(&self, entry: CatalogEntry) -> Result<(), CatalogError>;

    /// Current entry of `database.table`, if registered.
    async fn lookup(&self, database: &str, table: &str)
    -> Result<Option<CatalogEntry>, CatalogError>;
}

/// A shared catalog handle.
pub type CatalogRef = Arc<dyn Catalog>;

pub(crate) fn validate_identifier(value: &str) -> Result<(), CatalogError> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier {
            value: value.to_string(),
        })
    }
}

/// In-process catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: Mutex<HashMap<(String, String), CatalogEntry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registered entry, sorted by qualified name.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = entries.values().cloned().collect();
        all.sort_by_key(CatalogEntry::qualified_name);
        all
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn register_or_update(&self, entry: CatalogEntry) -> Result<(), CatalogError> {
        validate_identifier(&entry.database)?;
        validate_identifier(&entry.table)?;

        let key = (entry.database.clone(), entry.table.clone());
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
        Ok(())
    }

    async fn lookup(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(&(database.to_string(), table.to_string()))
            .cloned())
    }
}

/// Publishes converted locations to a catalog for one job.
pub struct CatalogPublisher {
    catalog: CatalogRef,
    /// Metrics label.
    target: String,
}

impl CatalogPublisher {
    pub fn new(catalog: CatalogRef, target: impl Into<String>) -> Self {
        Self {
            catalog,
            target: target.into(),
        }
    }

    /// Point `database.table` at `location`, replacing any previous entry.
    pub async fn publish(
        &self,
        database: &str,
        table: &str,
        location: &str,
        format: OutputFormat,
        compression: ParquetCompression,
        generation: Option<&GenerationToken>,
    ) -> Result<CatalogEntry, CatalogError> {
        let entry = CatalogEntry {
            database: database.to_string(),
            table: table.to_string(),
            location: location.to_string(),
            format,
            compression,
            generation: generation.cloned(),
            updated_at: Utc::now(),
        };

        self.catalog.register_or_update(entry.clone()).await?;

        emit!(CatalogEntryPublished {
            target: self.target.clone(),
        });
        info!(
            target = %self.target,
            table = %entry.qualified_name(),
            location = %entry.location,
            "Published catalog entry"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_replaces_existing_entry() {
        let catalog = Arc::new(MemoryCatalog::new());
        let publisher = CatalogPublisher::new(catalog.clone(), "test");

        publisher
            .publish(
                "stats",
                "company",
                "s3://bucket/backup/company/",
                OutputFormat::Parquet,
                ParquetCompression::Snappy,
                None,
            )
            .await
            .unwrap();
        let token = GenerationToken::new("2");
        publisher
            .publish(
                "stats",
                "company",
                "s3://bucket/backup-v2/company/",
                OutputFormat::Parquet,
                ParquetCompression::Zstd,
                Some(&token),
            )
            .await
            .unwrap();

        let entries = catalog.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].location, "s3://bucket/backup-v2/company/");
        assert_eq!(entries[0].compression, ParquetCompression::Zstd);
        assert_eq!(entries[0].generation, Some(token));
    }

    #[tokio::test]
    async fn test_invalid_identifiers_are_rejected() {
        let catalog = Arc::new(MemoryCatalog::new());
        let publisher = CatalogPublisher::new(catalog.clone(), "test");

        let err = publisher
            .publish(
                "stats",
                "bad-name",
                "file:///tmp/x/",
                OutputFormat::Parquet,
                ParquetCompression::Snappy,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidIdentifier { value } if value == "bad-name"));
        assert!(catalog.lookup("stats", "bad-name").await.unwrap().is_none());
    }
}
