//! Snapshot location.
//!
//! Snapshot roots are sibling prefixes whose names embed a fixed-width
//! timestamp, so the lexicographically greatest name is the newest one.

use thaw_core::StorageProvider;
use thaw_core::error::StorageError;
use tracing::debug;

/// File that marks a completed change export.
pub const MANIFEST_FILE: &str = "manifest-summary.json";

/// Pick the newest snapshot root out of sibling prefixes.
pub fn latest<I, S>(prefixes: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    prefixes.into_iter().map(Into::into).max()
}

/// Find the newest snapshot root directly under `prefix`.
///
/// Returns `None` when `prefix` has no children. A prefix that does not end
/// in `/` only considers children whose name starts with its last segment.
pub async fn locate_latest(
    storage: &StorageProvider,
    prefix: &str,
) -> Result<Option<String>, StorageError> {
    let children = storage.list_child_prefixes(prefix).await?;
    debug!(prefix, candidates = children.len(), "Listed snapshot roots");
    Ok(latest(children))
}

/// Keys derived from one change export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSnapshot {
    /// Key of the export's `manifest-summary.json`.
    pub manifest: String,
    /// Prefix holding the exported data objects.
    pub data_prefix: String,
}

impl ExportSnapshot {
    /// Build from a manifest key such as
    /// `dynamodb-export/<table>/AWSDynamoDB/<export-id>/manifest-summary.json`.
    pub fn from_manifest(manifest: &str) -> Option<Self> {
        let (root, _) = manifest.trim_start_matches('/').rsplit_once('/')?;
        Some(Self {
            manifest: manifest.to_string(),
            data_prefix: format!("{root}/data/"),
        })
    }

    /// Default output prefix: the first two segments of the manifest key
    /// followed by `catalog-data/`.
    pub fn default_output_prefix(&self) -> Option<String> {
        let segments: Vec<&str> = self
            .manifest
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        // Two leading segments plus the manifest file itself.
        if segments.len() < 3 {
            return None;
        }
        Some(format!("{}/{}/catalog-data/", segments[0], segments[1]))
    }
}

/// Find the newest export directly under `export_prefix`.
pub async fn locate_export(
    storage: &StorageProvider,
    export_prefix: &str,
) -> Result<Option<ExportSnapshot>, StorageError> {
    let prefix = format!("{}/", export_prefix.trim_end_matches('/'));
    let Some(export_root) = locate_latest(storage, &prefix).await? else {
        return Ok(None);
    };

    Ok(ExportSnapshot::from_manifest(&format!(
        "{export_root}{MANIFEST_FILE}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_latest_is_lexicographic_max() {
        let picked = latest([
            "exports/run-2024-01-01/",
            "exports/run-2024-02-01/",
            "exports/run-2023-12-31/",
        ]);
        assert_eq!(picked.as_deref(), Some("exports/run-2024-02-01/"));
    }

    #[test]
    fn test_latest_of_nothing_is_none() {
        assert_eq!(latest(Vec::<String>::new()), None);
    }

    #[test]
    fn test_export_snapshot_paths() {
        let snapshot = ExportSnapshot::from_manifest(
            "dynamodb-export/interview-bot/AWSDynamoDB/01742912651567-2103baf3/manifest-summary.json",
        )
        .unwrap();
        assert_eq!(
            snapshot.data_prefix,
            "dynamodb-export/interview-bot/AWSDynamoDB/01742912651567-2103baf3/data/"
        );
        assert_eq!(
            snapshot.default_output_prefix().as_deref(),
            Some("dynamodb-export/interview-bot/catalog-data/")
        );
    }

    #[test]
    fn test_short_manifest_has_no_default_output() {
        let snapshot = ExportSnapshot::from_manifest("export/manifest-summary.json").unwrap();
        assert_eq!(snapshot.data_prefix, "export/data/");
        assert_eq!(snapshot.default_output_prefix(), None);
        assert_eq!(ExportSnapshot::from_manifest("manifest-summary.json"), None);
    }

    #[tokio::test]
    async fn test_locate_latest_and_empty_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url_with_options(
            temp_dir.path().to_str().unwrap(),
            HashMap::new(),
        )
        .await
        .unwrap();

        assert_eq!(locate_latest(&storage, "exports/").await.unwrap(), None);

        for key in [
            "exports/run-2024-01-01/jobs.csv.gz",
            "exports/run-2024-02-01/jobs.csv.gz",
        ] {
            storage.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        assert_eq!(
            locate_latest(&storage, "exports/").await.unwrap().as_deref(),
            Some("exports/run-2024-02-01/")
        );
        assert_eq!(
            locate_latest(&storage, "exports/run-2024-01")
                .await
                .unwrap()
                .as_deref(),
            Some("exports/run-2024-01-01/")
        );
    }

    #[tokio::test]
    async fn test_locate_export() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url_with_options(
            temp_dir.path().to_str().unwrap(),
            HashMap::new(),
        )
        .await
        .unwrap();

        for key in [
            "ddb/bot/AWSDynamoDB/0001-a/manifest-summary.json",
            "ddb/bot/AWSDynamoDB/0002-b/manifest-summary.json",
        ] {
            storage.put(key, Bytes::from_static(b"{}")).await.unwrap();
        }

        let snapshot = locate_export(&storage, "ddb/bot/AWSDynamoDB")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot.manifest,
            "ddb/bot/AWSDynamoDB/0002-b/manifest-summary.json"
        );
        assert_eq!(snapshot.data_prefix, "ddb/bot/AWSDynamoDB/0002-b/data/");
    }
}
