use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

const LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Prometheus instruments for the job queue.
#[derive(Clone)]
pub struct QueueMetrics {
	pub jobs_submitted: IntCounter,
	pub jobs_rejected: IntCounter,
	pub jobs_completed: IntCounter,
	pub jobs_failed: IntCounter,
	pub sync_timeouts: IntCounter,
	pub late_completions: IntCounter,
	pub jobs_swept: IntCounter,
	pub queue_depth: IntGauge,
	pub active_workers: IntGauge,
	pub queue_latency: Histogram,
	pub processing_latency: Histogram,
}

impl QueueMetrics {
	/// Create the instruments and register them on `registry`.
	///
	/// # Errors
	/// Fails if a metric with the same name is already registered.
	pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let metrics = Self {
			jobs_submitted: IntCounter::new("job_queue_jobs_submitted_total", "Jobs admitted to the queue")?,
			jobs_rejected: IntCounter::new("job_queue_jobs_rejected_total", "Submissions rejected because the queue was full")?,
			jobs_completed: IntCounter::new("job_queue_jobs_completed_total", "Jobs that finished successfully")?,
			jobs_failed: IntCounter::new("job_queue_jobs_failed_total", "Jobs that ended in error")?,
			sync_timeouts: IntCounter::new("job_queue_sync_timeouts_total", "Synchronous callers that stopped waiting")?,
			late_completions: IntCounter::new("job_queue_late_completions_total", "Jobs finished after their synchronous caller stopped waiting")?,
			jobs_swept: IntCounter::new("job_queue_jobs_swept_total", "Finished jobs removed by the retention sweep")?,
			queue_depth: IntGauge::new("job_queue_depth", "Jobs waiting for a worker")?,
			active_workers: IntGauge::new("job_queue_active_workers", "Workers currently running a job")?,
			queue_latency: Histogram::with_opts(HistogramOpts::new("job_queue_wait_seconds", "Time from admission to start").buckets(LATENCY_BUCKETS.to_vec()))?,
			processing_latency: Histogram::with_opts(HistogramOpts::new("job_queue_processing_seconds", "Time spent inside the engine").buckets(LATENCY_BUCKETS.to_vec()))?,
		};

		registry.register(Box::new(metrics.jobs_submitted.clone()))?;
		registry.register(Box::new(metrics.jobs_rejected.clone()))?;
		registry.register(Box::new(metrics.jobs_completed.clone()))?;
		registry.register(Box::new(metrics.jobs_failed.clone()))?;
		registry.register(Box::new(metrics.sync_timeouts.clone()))?;
		registry.register(Box::new(metrics.late_completions.clone()))?;
		registry.register(Box::new(metrics.jobs_swept.clone()))?;
		registry.register(Box::new(metrics.queue_depth.clone()))?;
		registry.register(Box::new(metrics.active_workers.clone()))?;
		registry.register(Box::new(metrics.queue_latency.clone()))?;
		registry.register(Box::new(metrics.processing_latency.clone()))?;

		Ok(metrics)
	}
}
