//! Admission-controlled job queue for long-running, CPU-bound transcription.
//!
//! Submissions either get a slot in a fixed-capacity FIFO or are turned away
//! immediately with a retry hint. A fixed pool of blocking workers drains the
//! queue, and every job's lifecycle lives in a concurrent store that callers
//! can wait on (sync mode) or poll (async mode).

pub mod backpressure;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod worker;

pub use backpressure::{BackoffPolicy, BackoffStrategy, BackpressureReporter, RetryHint};
pub use config::QueueConfig;
pub use engine::{EngineError, Segment, Task, TranscribeOptions, TranscriptionEngine, TranscriptionOutput};
pub use error::QueueError;
pub use job::{JobId, JobInput, JobRecord, JobStatus, Transition};
pub use metrics::QueueMetrics;
pub use service::{JobQueue, QueueHealth, SubmitMode, SubmitOutcome};
pub use store::{JobStore, StoreCounts};
