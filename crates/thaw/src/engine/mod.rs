//! Tabular read/write engine.
//!
//! The pipeline only needs three capabilities from a dataframe engine: read
//! delimited text, read semi-structured records (flattening their nested
//! encoding), and write a table to a destination prefix in a columnar
//! format. [`TableEngine`] models exactly those so tests can substitute an
//! in-memory fake. [`ArrowEngine`] is the real implementation.
//!
//! Paths are object keys relative to the bucket. A path ending in `/` reads
//! every object under that prefix.

mod arrow_engine;
pub mod codec;
pub mod delimited;
pub mod flatten;
pub mod part_writer;
pub mod semi_structured;

pub use arrow_engine::ArrowEngine;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{DelimitedOptions, OutputFormat, ParquetCompression, SemiStructuredFormat};
use crate::error::EngineError;
use crate::generation::GenerationToken;

/// Number of rows per decoded record batch.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// An in-memory table: one schema, any number of batches.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Table {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// A table without columns or rows.
    pub fn empty() -> Self {
        Self::new(Arc::new(Schema::empty()), Vec::new())
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Whether the table has no columns. Such tables are never written.
    pub fn has_no_columns(&self) -> bool {
        self.schema.fields().is_empty()
    }
}

/// How a write treats what already exists under its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Remove everything under the destination prefix first.
    Overwrite,
    /// Add a new generation next to the existing ones.
    Append,
}

/// Destination and encoding of one table write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    /// Destination prefix; part files are written directly beneath it.
    pub path: String,
    pub format: OutputFormat,
    pub compression: ParquetCompression,
    pub mode: WriteMode,
    /// Token embedded in every part file name.
    pub generation: GenerationToken,
    /// Part files roll once they reach this many bytes.
    pub target_file_size: usize,
}

/// What a write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Keys of the part files written.
    pub files: Vec<String>,
    pub records: u64,
    pub bytes: usize,
}

/// Read/write capability consumed by the conversion pool.
#[async_trait]
pub trait TableEngine: Send + Sync {
    /// Read delimited text into a table.
    async fn read_delimited(
        &self,
        path: &str,
        options: &DelimitedOptions,
    ) -> Result<Table, EngineError>;

    /// Read newline-delimited records, flattening the nested encoding of `format`.
    async fn read_semi_structured(
        &self,
        path: &str,
        format: SemiStructuredFormat,
    ) -> Result<Table, EngineError>;

    /// Write a table under `request.path`.
    async fn write(&self, table: Table, request: &WriteRequest)
    -> Result<WriteSummary, EngineError>;
}

/// A shared engine handle.
pub type TableEngineRef = Arc<dyn TableEngine>;
