//! Mirror one storage prefix onto another.
//!
//! After a mirror the destination holds exactly the source's objects: every
//! source object is copied over, and destination objects with no counterpart
//! in the source are deleted.

use std::collections::HashSet;

use futures::{StreamExt, TryStreamExt, stream};
use thaw_core::StorageProvider;
use thaw_core::emit;
use thaw_core::error::StorageError;
use thaw_core::metrics::events::ObjectsDeleted;
use tracing::{debug, info};

const COPY_CONCURRENCY: usize = 16;

/// Objects touched by a mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorSummary {
    pub copied: u64,
    pub deleted: u64,
}

fn as_dir(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

/// Make `to` an exact copy of `from`.
pub async fn mirror(
    storage: &StorageProvider,
    from: &str,
    to: &str,
    target: &str,
) -> Result<MirrorSummary, StorageError> {
    let (from, to) = (as_dir(from), as_dir(to));

    let source: Vec<String> = storage
        .list_keys(&from)
        .await?
        .into_iter()
        .filter_map(|key| key.strip_prefix(&from).map(str::to_string))
        .collect();

    let copied: Vec<()> = stream::iter(source.clone())
        .map(|relative| {
            let (src, dst) = (format!("{from}{relative}"), format!("{to}{relative}"));
            async move { storage.copy(&src, &dst).await }
        })
        .buffer_unordered(COPY_CONCURRENCY)
        .try_collect()
        .await?;

    let wanted: HashSet<&str> = source.iter().map(String::as_str).collect();
    let orphans: Vec<String> = storage
        .list_keys(&to)
        .await?
        .into_iter()
        .filter(|key| {
            key.strip_prefix(&to)
                .is_none_or(|relative| !wanted.contains(relative))
        })
        .collect();

    for orphan in &orphans {
        debug!(target = %target, key = %orphan, "Deleting orphaned object");
    }
    let deleted = storage.delete_keys(&orphans).await?;
    if deleted > 0 {
        emit!(ObjectsDeleted {
            count: deleted,
            target: target.to_string(),
        });
    }

    let summary = MirrorSummary {
        copied: copied.len() as u64,
        deleted,
    };
    info!(
        target = %target,
        from = %from,
        to = %to,
        copied = summary.copied,
        deleted = summary.deleted,
        "Mirrored staging into target"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn storage(temp_dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(temp_dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_mirror_copies_and_deletes_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir).await;

        for key in ["tmp/company/a.parquet", "tmp/job/b.parquet"] {
            storage.put(key, Bytes::from_static(b"new")).await.unwrap();
        }
        for key in ["backup/company/a.parquet", "backup/company/old.parquet", "backup/gone/c.parquet"] {
            storage.put(key, Bytes::from_static(b"old")).await.unwrap();
        }

        let summary = mirror(&storage, "tmp", "backup/", "test").await.unwrap();
        assert_eq!(summary, MirrorSummary { copied: 2, deleted: 2 });

        assert_eq!(
            storage.list_keys("backup/").await.unwrap(),
            vec!["backup/company/a.parquet", "backup/job/b.parquet"]
        );
        let bytes = storage.get("backup/company/a.parquet").await.unwrap();
        assert_eq!(bytes.as_ref(), b"new");
        // Source is left in place.
        assert_eq!(storage.list_keys("tmp/").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mirror_of_empty_source_clears_destination() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir).await;
        storage
            .put("backup/x.parquet", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let summary = mirror(&storage, "tmp/", "backup/", "test").await.unwrap();
        assert_eq!(summary, MirrorSummary { copied: 0, deleted: 1 });
        assert!(storage.list_keys("backup/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sibling_prefix_is_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir).await;
        storage
            .put("backup-old/x.parquet", Bytes::from_static(b"x"))
            .await
            .unwrap();

        mirror(&storage, "tmp/", "backup/", "test").await.unwrap();
        assert_eq!(storage.list_keys("backup-old/").await.unwrap().len(), 1);
    }
}
