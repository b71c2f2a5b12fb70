//! Rolling Parquet part file writer.
//!
//! Encodes record batches into in-memory Parquet files named after the run's
//! generation, starting a new part once the current one reaches the target
//! size.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use tracing::debug;

use crate::config::ParquetCompression;
use crate::error::{EngineError, ParquetWriteSnafu};
use crate::generation::{GenerationToken, part_file_name};

/// A finished part file.
#[derive(Debug, Clone)]
pub struct PartFile {
    /// File name, relative to the destination prefix.
    pub name: String,
    pub bytes: Bytes,
    pub records: usize,
}

/// Writer properties for the configured codec.
pub fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    let codec = match compression {
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        ParquetCompression::Lz4 => Compression::LZ4,
    };

    WriterProperties::builder().set_compression(codec).build()
}

/// Writes one table as a sequence of size-bounded part files.
pub struct PartWriter {
    schema: SchemaRef,
    properties: WriterProperties,
    compression: ParquetCompression,
    generation: GenerationToken,
    target_file_size: usize,
    /// Destination label for error messages.
    path: String,
    writer: Option<ArrowWriter<Vec<u8>>>,
    current_records: usize,
    finished: Vec<PartFile>,
}

impl PartWriter {
    pub fn new(
        schema: SchemaRef,
        compression: ParquetCompression,
        generation: GenerationToken,
        target_file_size: usize,
        path: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            properties: writer_properties(compression),
            compression,
            generation,
            target_file_size: target_file_size.max(1),
            path: path.into(),
            writer: None,
            current_records: 0,
            finished: Vec::new(),
        }
    }

    fn open(&self) -> Result<ArrowWriter<Vec<u8>>, EngineError> {
        ArrowWriter::try_new(
            Vec::new(),
            self.schema.clone(),
            Some(self.properties.clone()),
        )
        .context(ParquetWriteSnafu { path: &self.path })
    }

    /// Write a batch to the current part, rolling afterwards if it is full.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), EngineError> {
        if self.writer.is_none() {
            self.writer = Some(self.open()?);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        writer
            .write(batch)
            .context(ParquetWriteSnafu { path: &self.path })?;
        self.current_records += batch.num_rows();

        let current_size = writer.bytes_written() + writer.in_progress_size();
        if current_size >= self.target_file_size {
            self.roll()?;
        }
        Ok(())
    }

    fn roll(&mut self) -> Result<(), EngineError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let buffer = writer
            .into_inner()
            .context(ParquetWriteSnafu { path: &self.path })?;
        let name = part_file_name(&self.generation, self.finished.len(), self.compression.as_str());

        debug!(
            path = %self.path,
            file = %name,
            bytes = buffer.len(),
            records = self.current_records,
            "Rolled part file"
        );

        self.finished.push(PartFile {
            name,
            bytes: Bytes::from(buffer),
            records: self.current_records,
        });
        self.current_records = 0;
        Ok(())
    }

    /// Finish the open part and return every part file.
    ///
    /// A table without rows still produces one part file carrying its schema.
    pub fn close(mut self) -> Result<Vec<PartFile>, EngineError> {
        if self.writer.is_none() && self.finished.is_empty() {
            self.writer = Some(self.open()?);
        }
        self.roll()?;
        Ok(self.finished)
    }
}
