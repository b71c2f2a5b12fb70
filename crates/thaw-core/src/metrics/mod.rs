//! Metrics instrumentation.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//!
//! No exporter is installed here. Events are recorded through the `metrics`
//! facade and reach whichever recorder the host process installs.

pub mod events;

/// Macro for emitting metric events (Vector-style pattern).
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use thaw_core::metrics::events::ObjectsDeleted;
///
/// emit!(ObjectsDeleted { count: 3, target: "interview-bot".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
