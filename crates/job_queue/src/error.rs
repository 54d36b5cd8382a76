use crate::job::{JobId, JobStatus};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
	#[error("admission queue is full")]
	Full,

	#[error("job queue is shutting down")]
	ShuttingDown,

	#[error("job {0} not found")]
	NotFound(JobId),

	#[error("job {job_id} failed: {message}")]
	JobFailed { job_id: JobId, message: String },

	#[error("job {job_id} did not finish within {waited:?}")]
	SyncTimeout { job_id: JobId, waited: Duration },

	#[error("job {job_id} cannot move from {from} to {to}")]
	InvalidTransition { job_id: JobId, from: JobStatus, to: JobStatus },

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("Prometheus error: {0}")]
	Metrics(#[from] prometheus::Error),
}
