//! Telemetry for the dispatch pipeline.
//!
//! Every stage can report what it did as a [`PipelineEvent`]. Events flow through a
//! [`TelemetrySink`], which is a `tower::Service<PipelineEvent>`, so sinks compose with standard
//! tower combinators.
//!
//! - **Rate limiter**: `Throttled`, `Admitted`
//! - **Retry**: `Attempt`, `Exhausted`
//! - **Pool dispatch**: `Acquired`, `Released`
//!
//! Emission is best effort: a sink that is not ready or fails simply loses the event.

pub mod events;
pub mod sinks;

pub use events::{AdmissionEvent, PipelineEvent, PoolEvent, RetryEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
