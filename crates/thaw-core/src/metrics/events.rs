//! Internal events for thaw metrics emission.
//!
//! Each event struct represents a measurable occurrence in an ingestion run.
//! Events carry a `target` label naming the job they belong to.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Storage operation types for metrics labeling.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    Delete,
    List,
    Copy,
    Rename,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
            StorageOperation::List => "list",
            StorageOperation::Copy => "copy",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Request status for metrics labeling.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted for each storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "thaw_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the duration of a storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "thaw_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when source objects are discovered under a snapshot.
pub struct ObjectsDiscovered {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for ObjectsDiscovered {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Objects discovered");
        counter!("thaw_objects_discovered_total", "target" => self.target).increment(self.count);
    }
}

/// Status of a finished conversion job.
#[derive(Debug, Clone, Copy)]
pub enum JobStatus {
    Success,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a conversion job finishes.
pub struct ConversionCompleted {
    pub status: JobStatus,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for ConversionCompleted {
    fn emit(self) {
        trace!(status = self.status.as_str(), target = %self.target, "Conversion completed");
        counter!(
            "thaw_conversions_total",
            "status" => self.status.as_str(),
            "target" => self.target.clone()
        )
        .increment(1);
        histogram!("thaw_conversion_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// Gauge of conversion jobs currently executing.
pub struct ActiveConversions {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for ActiveConversions {
    fn emit(self) {
        gauge!("thaw_active_conversions", "target" => self.target).set(self.count as f64);
    }
}

/// Event emitted when records are decoded from source objects.
pub struct RecordsConverted {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsConverted {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records converted");
        counter!("thaw_records_converted_total", "target" => self.target).increment(self.count);
    }
}

/// Event emitted when a part file is written to storage.
pub struct PartFileWritten {
    pub bytes: usize,
    pub target: String,
}

impl InternalEvent for PartFileWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, target = %self.target, "Part file written");
        counter!("thaw_part_files_written_total", "target" => self.target.clone()).increment(1);
        counter!("thaw_bytes_written_total", "target" => self.target).increment(self.bytes as u64);
    }
}

/// Event emitted when a catalog entry is registered or replaced.
pub struct CatalogEntryPublished {
    pub target: String,
}

impl InternalEvent for CatalogEntryPublished {
    fn emit(self) {
        trace!(target = %self.target, "Catalog entry published");
        counter!("thaw_catalog_entries_published_total", "target" => self.target).increment(1);
    }
}

/// Event emitted with the number of output generations found by the reaper.
pub struct GenerationsFound {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for GenerationsFound {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Generations found");
        gauge!("thaw_output_generations", "target" => self.target).set(self.count as f64);
    }
}

/// Event emitted when objects are deleted by the reaper or the mirror.
pub struct ObjectsDeleted {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for ObjectsDeleted {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Objects deleted");
        counter!("thaw_objects_deleted_total", "target" => self.target).increment(self.count);
    }
}
