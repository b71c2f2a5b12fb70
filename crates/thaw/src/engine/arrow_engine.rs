//! Arrow/Parquet implementation of [`TableEngine`] over a storage provider.

use arrow::error::ArrowError;
use async_trait::async_trait;
use snafu::prelude::*;
use thaw_core::emit;
use thaw_core::metrics::events::{PartFileWritten, RecordsConverted};
use thaw_core::storage::StorageProviderRef;
use tracing::{debug, info};

use super::codec::codec_for_path;
use super::delimited::decode_delimited;
use super::part_writer::PartWriter;
use super::semi_structured::{parse_records, records_to_table};
use super::{DEFAULT_BATCH_SIZE, Table, TableEngine, WriteMode, WriteRequest, WriteSummary};
use crate::config::{DelimitedOptions, OutputFormat, SemiStructuredFormat};
use crate::error::{
    DecompressSnafu, EmptyTableSnafu, EngineError, EngineStorageSnafu, SchemaMergeSnafu,
    TaskJoinSnafu,
};

/// Reads and writes tables through object storage. Decoding and encoding run
/// on the blocking pool.
pub struct ArrowEngine {
    storage: StorageProviderRef,
    batch_size: usize,
    /// Metrics label.
    target: String,
}

impl ArrowEngine {
    pub fn new(storage: StorageProviderRef, target: impl Into<String>) -> Self {
        Self {
            storage,
            batch_size: DEFAULT_BATCH_SIZE,
            target: target.into(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Keys a read covers: everything under a `/`-terminated prefix, or the key itself.
    async fn resolve_keys(&self, path: &str) -> Result<Vec<String>, EngineError> {
        if path.ends_with('/') {
            self.storage
                .list_keys(path)
                .await
                .context(EngineStorageSnafu { path })
        } else {
            Ok(vec![path.to_string()])
        }
    }

    /// Fetch an object and strip its compression.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, EngineError> {
        let compressed = self
            .storage
            .get(key)
            .await
            .context(EngineStorageSnafu { path: key })?;

        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            codec_for_path(&key)
                .decompress(&compressed)
                .context(DecompressSnafu { path: &key })
        })
        .await
        .context(TaskJoinSnafu)?
    }

    fn emit_records(&self, table: &Table) {
        emit!(RecordsConverted {
            count: table.num_rows() as u64,
            target: self.target.clone(),
        });
    }
}

/// Concatenate per-object tables, requiring identical schemas.
fn concat_tables(path: &str, tables: Vec<Table>) -> Result<Table, EngineError> {
    let mut tables = tables.into_iter().filter(|t| !t.has_no_columns());
    let Some(mut merged) = tables.next() else {
        return Ok(Table::empty());
    };

    for table in tables {
        if table.schema != merged.schema {
            return Err(ArrowError::SchemaError(format!(
                "expected columns [{}], found [{}]",
                column_list(&merged),
                column_list(&table)
            )))
            .context(SchemaMergeSnafu { path });
        }
        merged.batches.extend(table.batches);
    }

    Ok(merged)
}

fn column_list(table: &Table) -> String {
    table
        .schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Destination prefix with exactly one trailing `/`.
fn destination_prefix(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

#[async_trait]
impl TableEngine for ArrowEngine {
    async fn read_delimited(
        &self,
        path: &str,
        options: &DelimitedOptions,
    ) -> Result<Table, EngineError> {
        let keys = self.resolve_keys(path).await?;

        let mut tables = Vec::with_capacity(keys.len());
        for key in keys {
            let data = self.fetch(&key).await?;
            let options = options.clone();
            let batch_size = self.batch_size;
            let table = tokio::task::spawn_blocking(move || {
                decode_delimited(&data, &key, &options, batch_size)
            })
            .await
            .context(TaskJoinSnafu)??;
            tables.push(table);
        }

        let table = concat_tables(path, tables)?;
        debug!(path, rows = table.num_rows(), "Read delimited table");
        self.emit_records(&table);
        Ok(table)
    }

    async fn read_semi_structured(
        &self,
        path: &str,
        format: SemiStructuredFormat,
    ) -> Result<Table, EngineError> {
        let keys = self.resolve_keys(path).await?;

        let mut records = Vec::new();
        for key in keys {
            let data = self.fetch(&key).await?;
            let parsed =
                tokio::task::spawn_blocking(move || parse_records(&data, &key, format))
                    .await
                    .context(TaskJoinSnafu)??;
            records.extend(parsed);
        }

        let label = path.to_string();
        let batch_size = self.batch_size;
        let table =
            tokio::task::spawn_blocking(move || records_to_table(&records, &label, batch_size))
                .await
                .context(TaskJoinSnafu)??;

        debug!(path, rows = table.num_rows(), "Read semi-structured table");
        self.emit_records(&table);
        Ok(table)
    }

    async fn write(
        &self,
        table: Table,
        request: &WriteRequest,
    ) -> Result<WriteSummary, EngineError> {
        // Overwriting with nothing would drop the destination's data.
        if table.has_no_columns() {
            ensure!(
                request.mode == WriteMode::Append,
                EmptyTableSnafu {
                    path: &request.path
                }
            );
            debug!(path = %request.path, "Skipping append of table without columns");
            return Ok(WriteSummary::default());
        }

        let destination = destination_prefix(&request.path);
        if request.mode == WriteMode::Overwrite {
            let removed = self
                .storage
                .delete_prefix(&destination)
                .await
                .context(EngineStorageSnafu { path: &destination })?;
            if removed > 0 {
                debug!(path = %destination, removed, "Cleared destination before overwrite");
            }
        }

        let records = table.num_rows() as u64;
        let parts = match request.format {
            OutputFormat::Parquet => {
                let mut writer = PartWriter::new(
                    table.schema.clone(),
                    request.compression,
                    request.generation.clone(),
                    request.target_file_size,
                    destination.clone(),
                );
                tokio::task::spawn_blocking(move || {
                    for batch in &table.batches {
                        writer.write_batch(batch)?;
                    }
                    writer.close()
                })
                .await
                .context(TaskJoinSnafu)??
            }
        };

        let mut summary = WriteSummary {
            records,
            ..WriteSummary::default()
        };
        for part in parts {
            let key = format!("{destination}{}", part.name);
            let size = part.bytes.len();
            self.storage
                .put_parquet(&key, part.bytes)
                .await
                .context(EngineStorageSnafu { path: &key })?;

            emit!(PartFileWritten {
                bytes: size,
                target: self.target.clone(),
            });
            summary.bytes += size;
            summary.files.push(key);
        }

        info!(
            path = %destination,
            files = summary.files.len(),
            records,
            bytes = summary.bytes,
            "Wrote table"
        );
        Ok(summary)
    }
}
