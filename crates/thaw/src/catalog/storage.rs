//! Catalog persisted in object storage.
//!
//! Entries live at `{uri}/{database}/{table}.json` and are replaced with an
//! atomic write (temp object + rename), so readers never see a partial entry.

use async_trait::async_trait;
use snafu::prelude::*;
use thaw_core::storage::StorageProviderRef;
use tracing::debug;

use super::{Catalog, CatalogEntry, validate_identifier};
use crate::error::{CatalogError, CatalogStorageSnafu, DeserializeSnafu, SerializeSnafu};

/// Catalog backed by JSON documents under a storage prefix.
pub struct StorageCatalog {
    storage: StorageProviderRef,
}

impl StorageCatalog {
    /// `storage` is rooted at the catalog URI.
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    fn entry_key(database: &str, table: &str) -> String {
        format!("{database}/{table}.json")
    }
}

#[async_trait]
impl Catalog for StorageCatalog {
    async fn register_or_update(&self, entry: CatalogEntry) -> Result<(), CatalogError> {
        validate_identifier(&entry.database)?;
        validate_identifier(&entry.table)?;

        let key = Self::entry_key(&entry.database, &entry.table);
        let json = serde_json::to_vec_pretty(&entry).context(SerializeSnafu { key: &key })?;

        self.storage
            .atomic_write(&key, json)
            .await
            .context(CatalogStorageSnafu { key: &key })?;

        debug!(key = %key, location = %entry.location, "Stored catalog entry");
        Ok(())
    }

    async fn lookup(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        validate_identifier(database)?;
        validate_identifier(table)?;

        let key = Self::entry_key(database, table);
        let bytes = match self.storage.get(&key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(source) => return Err(CatalogError::CatalogStorage { key, source }),
        };

        let entry = serde_json::from_slice(&bytes).context(DeserializeSnafu { key: &key })?;
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, ParquetCompression};
    use crate::generation::GenerationToken;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use thaw_core::StorageProvider;

    async fn catalog(temp_dir: &TempDir) -> (StorageCatalog, StorageProviderRef) {
        let storage = Arc::new(
            StorageProvider::for_url_with_options(
                temp_dir.path().to_str().unwrap(),
                HashMap::new(),
            )
            .await
            .unwrap(),
        );
        (StorageCatalog::new(storage.clone()), storage)
    }

    fn entry(location: &str) -> CatalogEntry {
        CatalogEntry {
            database: "stats".to_string(),
            table: "interview_sessions".to_string(),
            location: location.to_string(),
            format: OutputFormat::Parquet,
            compression: ParquetCompression::Snappy,
            generation: Some(GenerationToken::new("0001700000000000")),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lookup_missing_entry() {
        let temp_dir = TempDir::new().unwrap();
        let (catalog, _) = catalog(&temp_dir).await;
        assert!(catalog.lookup("stats", "nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_then_replace() {
        let temp_dir = TempDir::new().unwrap();
        let (catalog, storage) = catalog(&temp_dir).await;

        catalog
            .register_or_update(entry("s3://bucket/a/catalog-data/"))
            .await
            .unwrap();
        catalog
            .register_or_update(entry("s3://bucket/b/catalog-data/"))
            .await
            .unwrap();

        let found = catalog
            .lookup("stats", "interview_sessions")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.location, "s3://bucket/b/catalog-data/");
        assert_eq!(
            storage.list_keys("stats/").await.unwrap(),
            vec!["stats/interview_sessions.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let (catalog, storage) = catalog(&temp_dir).await;
        storage
            .put("stats/broken.json", bytes::Bytes::from_static(b"{not json"))
            .await
            .unwrap();

        let err = catalog.lookup("stats", "broken").await.unwrap_err();
        assert!(matches!(err, CatalogError::Deserialize { .. }));
    }
}
