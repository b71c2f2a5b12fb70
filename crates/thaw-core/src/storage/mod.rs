//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface for working with S3, GCS and the local
//! filesystem. Keys passed to and returned from the provider are relative to
//! the key prefix of the URL it was built from (usually the bucket root).

mod gcs;
mod local;
mod s3;
mod url_parser;

pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Maximum concurrent deletes issued by [`StorageProvider::delete_prefix`].
const DELETE_CONCURRENCY: usize = 16;

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.location_url(""))
    }
}

fn is_root(path: &Path) -> bool {
    path.parts().next().is_none()
}

fn record(operation: StorageOperation, start: Instant, ok: bool) {
    emit!(StorageRequest {
        operation,
        status: RequestStatus::from_ok(ok),
    });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Gcs(config) => Self::construct_gcs(config).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    fn key_part_count(&self) -> usize {
        self.config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default()
    }

    fn relative(&self, path: &Path) -> String {
        path.parts()
            .skip(self.key_part_count())
            .collect::<Path>()
            .to_string()
    }

    /// Canonical URL of a key, as recorded in catalog entries.
    ///
    /// A trailing `/` on the key is preserved so prefixes stay recognisable.
    pub fn location_url(&self, key: &str) -> String {
        let path = Path::from(key);
        let qualified = self.qualify_path(&path);
        let mut url = self.config.root_url();
        if !is_root(&qualified) {
            url.push('/');
            url.push_str(&qualified.to_string());
        }
        if key.ends_with('/') {
            url.push('/');
        }
        url
    }

    /// List every object under `prefix`, recursively.
    ///
    /// The prefix is matched on whole path segments. A missing prefix yields
    /// an empty listing. Keys are returned sorted.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = Path::from(prefix);
        let qualified = self.qualify_path(&prefix);
        let start = Instant::now();

        let scope = (!is_root(&qualified)).then_some(&*qualified);
        let listed: Result<Vec<_>, _> = self.object_store.list(scope).try_collect().await;
        record(StorageOperation::List, start, listed.is_ok());

        let metas = match listed.context(ObjectStoreSnafu) {
            Ok(metas) => metas,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };

        let mut keys: Vec<String> = metas.iter().map(|m| self.relative(&m.location)).collect();
        keys.sort();
        debug!(prefix = %prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    /// List the immediate child prefixes of `prefix` (one level, delimited).
    ///
    /// A prefix ending in `/` lists the children of that directory. Otherwise
    /// the final segment is treated as a name fragment and only children of
    /// the parent whose name starts with it are returned. Children are
    /// returned with a trailing `/`, sorted.
    pub async fn list_child_prefixes(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let (parent, fragment) = match prefix.rfind('/') {
            Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
            None => ("", prefix),
        };

        let parent = Path::from(parent);
        let qualified = self.qualify_path(&parent);
        let start = Instant::now();

        let scope = (!is_root(&qualified)).then_some(&*qualified);
        let listed = self.object_store.list_with_delimiter(scope).await;
        record(StorageOperation::List, start, listed.is_ok());

        let common_prefixes = match listed.context(ObjectStoreSnafu) {
            Ok(result) => result.common_prefixes,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };

        let mut children: Vec<String> = common_prefixes
            .iter()
            .filter(|child| {
                child
                    .filename()
                    .is_some_and(|name| name.starts_with(fragment))
            })
            .map(|child| format!("{}/", self.relative(child)))
            .collect();
        children.sort();
        Ok(children)
    }

    /// Get the contents of a file.
    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = Path::from(key);
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;
        record(StorageOperation::Get, start, result.is_ok());

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to a key.
    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        self.put_payload_with_opts(&Path::from(key), PutPayload::from(bytes), PutOptions::default())
            .await
    }

    /// Put a Parquet file to a key with the correct content type.
    ///
    /// Sets `Content-Type: application/vnd.apache.parquet` on cloud storage backends.
    /// Local filesystem doesn't support attributes, so they are skipped.
    pub async fn put_parquet(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let opts = if matches!(self.config, BackendConfig::Local(_)) {
            PutOptions::default()
        } else {
            PutOptions {
                attributes: Attributes::from_iter([(
                    Attribute::ContentType,
                    AttributeValue::from("application/vnd.apache.parquet"),
                )]),
                ..Default::default()
            }
        };
        self.put_payload_with_opts(&Path::from(key), PutPayload::from(bytes), opts)
            .await
    }

    async fn put_payload_with_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;
        record(StorageOperation::Put, start, result.is_ok());

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete the object at `key`.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = Path::from(key);
        let path = self.qualify_path(&path);
        let start = Instant::now();
        let result = self.object_store.delete(&path).await;
        record(StorageOperation::Delete, start, result.is_ok());

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete the given keys concurrently, returning how many were removed.
    ///
    /// Keys that are already gone are skipped without error.
    pub async fn delete_keys(&self, keys: &[String]) -> Result<u64, StorageError> {
        let deleted: Vec<bool> = stream::iter(keys.to_vec())
            .map(|key| async move {
                match self.delete(&key).await {
                    Ok(()) => Ok(true),
                    Err(err) if err.is_not_found() => Ok(false),
                    Err(err) => Err(err),
                }
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(deleted.into_iter().filter(|removed| *removed).count() as u64)
    }

    /// Delete every object under `prefix`, returning how many were removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let keys = self.list_keys(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete_keys(&keys).await
    }

    /// Server-side copy, overwriting the destination.
    pub async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let (from, to) = (Path::from(from), Path::from(to));
        let start = Instant::now();
        let result = self
            .object_store
            .copy(&self.qualify_path(&from), &self.qualify_path(&to))
            .await;
        record(StorageOperation::Copy, start, result.is_ok());

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Server-side rename (move), overwriting the destination.
    ///
    /// S3 implements this as copy + delete, GCS as a rewrite, the local
    /// filesystem as `rename(2)`.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let (from, to) = (Path::from(from), Path::from(to));
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&self.qualify_path(&from), &self.qualify_path(&to))
            .await;
        record(StorageOperation::Rename, start, result.is_ok());

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Atomically write content to a key using temp file + rename.
    ///
    /// The target is never partially written: content goes to `{key}.tmp`
    /// first, then replaces `{key}`. If either step fails the original
    /// object (if any) is unchanged.
    pub async fn atomic_write(&self, key: &str, content: Vec<u8>) -> Result<(), StorageError> {
        let temp_key = format!("{key}.tmp");
        self.put(&temp_key, Bytes::from(content)).await?;
        self.rename(&temp_key, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local_provider(temp_dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(temp_dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        storage
            .put("exports/run-1/jobs.csv.gz", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let bytes = storage.get("exports/run-1/jobs.csv.gz").await.unwrap();
        assert_eq!(bytes.as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        let err = storage.get("missing/object").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_keys_is_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        for key in ["a/run-2/b.csv.gz", "a/run-1/x/y.csv.gz", "other/z.csv.gz"] {
            storage.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let keys = storage.list_keys("a/").await.unwrap();
        assert_eq!(keys, vec!["a/run-1/x/y.csv.gz", "a/run-2/b.csv.gz"]);

        let all = storage.list_keys("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_list_keys_missing_prefix_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        assert!(storage.list_keys("nothing/here/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_child_prefixes() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        for key in [
            "backups/run-2024-01-01/jobs.csv.gz",
            "backups/run-2024-02-01/jobs.csv.gz",
            "backups/other/file.csv.gz",
            "backups/loose.csv.gz",
        ] {
            storage.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let children = storage.list_child_prefixes("backups/").await.unwrap();
        assert_eq!(
            children,
            vec![
                "backups/other/",
                "backups/run-2024-01-01/",
                "backups/run-2024-02-01/"
            ]
        );

        let partial = storage.list_child_prefixes("backups/run-").await.unwrap();
        assert_eq!(
            partial,
            vec!["backups/run-2024-01-01/", "backups/run-2024-02-01/"]
        );

        assert!(
            storage
                .list_child_prefixes("missing/")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_delete_prefix_counts_removed_objects() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        for key in ["stage/a/1.parquet", "stage/b/2.parquet", "keep/3.parquet"] {
            storage.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        assert_eq!(storage.delete_prefix("stage/").await.unwrap(), 2);
        assert!(storage.list_keys("stage/").await.unwrap().is_empty());
        assert_eq!(storage.list_keys("keep/").await.unwrap().len(), 1);
        assert_eq!(storage.delete_prefix("stage/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_copy_and_rename() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        storage.put("src/a", Bytes::from_static(b"data")).await.unwrap();
        storage.copy("src/a", "dst/nested/a").await.unwrap();
        assert_eq!(storage.get("dst/nested/a").await.unwrap().as_ref(), b"data");
        assert!(storage.get("src/a").await.is_ok());

        storage.rename("src/a", "moved/a").await.unwrap();
        assert!(storage.get("src/a").await.unwrap_err().is_not_found());
        assert_eq!(storage.get("moved/a").await.unwrap().as_ref(), b"data");
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        storage
            .atomic_write("catalog/db/table.json", b"first".to_vec())
            .await
            .unwrap();
        storage
            .atomic_write("catalog/db/table.json", b"second".to_vec())
            .await
            .unwrap();

        let content = storage.get("catalog/db/table.json").await.unwrap();
        assert_eq!(content.as_ref(), b"second");
        assert_eq!(
            storage.list_keys("catalog/").await.unwrap(),
            vec!["catalog/db/table.json"]
        );
    }

    #[tokio::test]
    async fn test_location_url() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;
        let root = temp_dir.path().to_str().unwrap().trim_end_matches('/');

        assert_eq!(
            storage.location_url("target/jobs/"),
            format!("file://{root}/target/jobs/")
        );
        assert_eq!(storage.location_url(""), format!("file://{root}"));
    }
}
