use crate::config::QueueConfig;
use serde::Serialize;
use std::time::Duration;

pub const MIN_RETRY_AFTER: Duration = Duration::from_secs(30);
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
	Exponential,
}

/// Client retry schedule suggested alongside a busy response. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackoffPolicy {
	pub strategy: BackoffStrategy,
	pub initial_delay_secs: u64,
	pub multiplier: f64,
	pub max_delay_secs: u64,
}

impl BackoffPolicy {
	/// Suggested wait before retry number `attempt` (0-based).
	#[must_use]
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
		#[allow(clippy::cast_precision_loss)]
		let delay = self.initial_delay_secs as f64 * self.multiplier.powi(exponent);
		#[allow(clippy::cast_precision_loss)]
		let ceiling = self.max_delay_secs as f64;

		Duration::from_secs_f64(delay.min(ceiling).max(0.0))
	}
}

/// Everything a caller needs to shape a "busy" response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryHint {
	pub retry_after_secs: u64,
	pub queue_depth: usize,
	pub queue_capacity: usize,
	pub active_workers: usize,
	pub backoff: BackoffPolicy,
}

/// Turns queue depth into a retry-after estimate.
#[derive(Debug, Clone)]
pub struct BackpressureReporter {
	avg_processing_time: Duration,
	backoff: BackoffPolicy,
}

impl BackpressureReporter {
	#[must_use]
	pub fn new(config: &QueueConfig) -> Self {
		Self {
			avg_processing_time: config.avg_processing_time,
			backoff: BackoffPolicy {
				strategy: BackoffStrategy::Exponential,
				initial_delay_secs: config.backoff_initial.as_secs(),
				multiplier: config.backoff_multiplier,
				max_delay_secs: config.backoff_max.as_secs(),
			},
		}
	}

	/// `clamp(queued_jobs * avg_processing_time, 30s, 300s)`
	#[must_use]
	pub fn retry_after(&self, queued_jobs: usize) -> Duration {
		let queued = u32::try_from(queued_jobs).unwrap_or(u32::MAX);
		self.avg_processing_time.saturating_mul(queued).clamp(MIN_RETRY_AFTER, MAX_RETRY_AFTER)
	}

	#[must_use]
	pub fn hint(&self, queue_depth: usize, queue_capacity: usize, active_workers: usize) -> RetryHint {
		RetryHint {
			retry_after_secs: self.retry_after(queue_depth).as_secs(),
			queue_depth,
			queue_capacity,
			active_workers,
			backoff: self.backoff.clone(),
		}
	}
}
