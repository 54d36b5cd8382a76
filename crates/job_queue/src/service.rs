use crate::backpressure::{BackpressureReporter, RetryHint};
use crate::config::QueueConfig;
use crate::engine::TranscriptionEngine;
use crate::error::QueueError;
use crate::job::{JobId, JobInput, JobRecord, JobStatus};
use crate::metrics::QueueMetrics;
use crate::queue::{self, AdmissionQueue};
use crate::store::JobStore;
use crate::sweeper::spawn_sweeper;
use crate::worker::{WorkerContext, WorkerPool};
use prometheus::Registry;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// How the caller wants to wait for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
	/// Block until the job finishes or the sync timeout elapses
	Sync,
	/// Return as soon as the job is queued
	Async,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
	/// Sync mode: the job finished successfully
	Complete(JobRecord),
	/// Async mode: the job is waiting for a worker
	Queued(JobRecord),
	/// The queue was full; nothing was created
	Busy(RetryHint),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueHealth {
	pub active_workers: usize,
	pub queued_jobs: usize,
	pub processing_jobs: usize,
	pub queue_capacity: usize,
	pub configured_workers: usize,
	pub stored_jobs: usize,
}

/// Entry point for request handlers: admission, sync/async waiting, status and health.
///
/// Owns the store, the admission queue, the worker pool and the sweeper. Build one
/// at startup, share it behind an `Arc`, and call [`JobQueue::shutdown`] on exit.
pub struct JobQueue {
	config: QueueConfig,
	store: Arc<JobStore>,
	queue: Arc<AdmissionQueue>,
	pool: Mutex<Option<WorkerPool>>,
	sweeper: Mutex<Option<JoinHandle<()>>>,
	busy: Arc<AtomicUsize>,
	cancellation_token: CancellationToken,
	reporter: BackpressureReporter,
	metrics: QueueMetrics,
	engine_name: String,
}

impl JobQueue {
	/// Validate `config`, register metrics and start workers and sweeper.
	///
	/// Must be called from within a Tokio runtime.
	///
	/// # Errors
	/// `Config` for invalid settings, `Metrics` if registration fails.
	pub fn start(config: QueueConfig, engine: Arc<dyn TranscriptionEngine>, registry: &Registry) -> Result<Self, QueueError> {
		config.validate()?;

		let metrics = QueueMetrics::new(registry)?;
		let store = Arc::new(JobStore::new());
		let (queue, receiver) = queue::bounded(config.max_queue_size);
		let queue = Arc::new(queue);
		let engine_name = engine.name().to_string();

		let ctx = WorkerContext {
			store: Arc::clone(&store),
			queue: Arc::clone(&queue),
			receiver: Arc::new(receiver),
			engine,
			metrics: metrics.clone(),
		};
		let pool = WorkerPool::start(config.max_workers, &ctx);
		let busy = pool.busy_counter();

		let cancellation_token = CancellationToken::new();
		let sweeper = spawn_sweeper(Arc::clone(&store), config.job_retention, config.sweep_interval, metrics.clone(), cancellation_token.clone());

		info!(
			max_workers = config.max_workers,
			max_queue_size = config.max_queue_size,
			retention_secs = config.job_retention.as_secs(),
			sync_timeout_secs = config.sync_timeout.as_secs(),
			engine = %engine_name,
			"📊 Job queue started"
		);

		Ok(Self {
			reporter: BackpressureReporter::new(&config),
			config,
			store,
			queue,
			pool: Mutex::new(Some(pool)),
			sweeper: Mutex::new(Some(sweeper)),
			busy,
			cancellation_token,
			metrics,
			engine_name,
		})
	}

	/// Admit a job and, in sync mode, wait for it.
	///
	/// A full queue is an outcome (`Busy`), not an error, and leaves no trace in
	/// the store. Ownership of `input.audio_path` passes to the queue only when
	/// the job is admitted.
	///
	/// # Errors
	/// `ShuttingDown` after shutdown began; in sync mode also `JobFailed` and
	/// `SyncTimeout`. A timed-out job is not cancelled and stays queryable.
	#[instrument(name = "submit", skip(self, input), fields(model = %input.model))]
	pub async fn submit(&self, input: JobInput, mode: SubmitMode) -> Result<SubmitOutcome, QueueError> {
		let job = match self.admit(input) {
			Ok(job) => job,
			Err(QueueError::Full) => {
				self.metrics.jobs_rejected.inc();
				let hint = self.retry_hint();
				warn!(
					queue_depth = hint.queue_depth,
					queue_capacity = hint.queue_capacity,
					retry_after_secs = hint.retry_after_secs,
					"🚦 Queue full, rejecting submission"
				);
				return Ok(SubmitOutcome::Busy(hint));
			}
			Err(e) => return Err(e),
		};

		match mode {
			SubmitMode::Async => Ok(SubmitOutcome::Queued(job)),
			SubmitMode::Sync => self.wait_for(job.id).await.map(SubmitOutcome::Complete),
		}
	}

	/// Reserve a slot, then create and commit the record, all under the admission gate.
	fn admit(&self, input: JobInput) -> Result<JobRecord, QueueError> {
		let permit = self.queue.try_reserve()?;
		let job = self.store.create(input);
		permit.commit(job.id);

		self.metrics.jobs_submitted.inc();
		self.metrics.queue_depth.set(i64::try_from(self.queue.depth()).unwrap_or(i64::MAX));
		info!(job_id = %job.id, seq = job.seq, queue_depth = self.queue.depth(), "📨 Job queued");

		Ok(job)
	}

	/// Wait until `job_id` is terminal, bounded by the sync timeout.
	///
	/// Wakes on the job's status notification and re-reads the store at least
	/// every `sync_poll_interval`.
	///
	/// # Errors
	/// `NotFound`, `JobFailed` or `SyncTimeout`.
	pub async fn wait_for(&self, job_id: JobId) -> Result<JobRecord, QueueError> {
		let mut status_rx = self.store.subscribe(&job_id).ok_or(QueueError::NotFound(job_id))?;
		let poll_interval = self.config.sync_poll_interval;
		let timeout = self.config.sync_timeout;

		let waited = tokio::time::timeout(timeout, async {
			loop {
				match self.store.get(&job_id) {
					Some(job) if !job.is_terminal() => {}
					_ => return,
				}

				tokio::select! {
					changed = status_rx.changed() => {
						if changed.is_err() {
							tokio::time::sleep(poll_interval).await;
						}
					}
					() = tokio::time::sleep(poll_interval) => {}
				}
			}
		})
		.await;

		if waited.is_err() {
			self.store.abandon(&job_id);
			self.metrics.sync_timeouts.inc();
			warn!(%job_id, timeout_secs = timeout.as_secs(), "⏱️ Sync caller stopped waiting; job continues in background");
			return Err(QueueError::SyncTimeout { job_id, waited: timeout });
		}

		let job = self.store.get(&job_id).ok_or(QueueError::NotFound(job_id))?;
		settle(job, timeout)
	}

	/// Snapshot of one job.
	///
	/// # Errors
	/// `NotFound` for ids that never existed or were already swept.
	pub fn query_status(&self, job_id: &JobId) -> Result<JobRecord, QueueError> {
		self.store.get(job_id).ok_or(QueueError::NotFound(*job_id))
	}

	#[must_use]
	pub fn query_health(&self) -> QueueHealth {
		let counts = self.store.counts();
		QueueHealth {
			active_workers: self.busy.load(Ordering::Acquire),
			queued_jobs: self.queue.depth(),
			processing_jobs: counts.processing,
			queue_capacity: self.queue.capacity(),
			configured_workers: self.config.max_workers,
			stored_jobs: counts.total(),
		}
	}

	/// Current retry hint, as returned with a `Busy` outcome.
	#[must_use]
	pub fn retry_hint(&self) -> RetryHint {
		self.reporter.hint(self.queue.depth(), self.queue.capacity(), self.busy.load(Ordering::Acquire))
	}

	#[must_use]
	pub const fn config(&self) -> &QueueConfig {
		&self.config
	}

	#[must_use]
	pub const fn metrics(&self) -> &QueueMetrics {
		&self.metrics
	}

	#[must_use]
	pub fn engine_name(&self) -> &str {
		&self.engine_name
	}

	#[must_use]
	pub fn is_shutting_down(&self) -> bool {
		self.queue.is_closed()
	}

	/// Stop admitting, stop the sweeper, let workers drain what was admitted, and join them.
	///
	/// Running engine calls are never interrupted. Calling this twice is harmless.
	pub async fn shutdown(&self) {
		info!("🛑 Job queue shutting down");
		self.queue.close();
		self.cancellation_token.cancel();

		if let Some(sweeper) = self.sweeper.lock().await.take() {
			if let Err(e) = sweeper.await {
				warn!(error = %e, "⚠️ Sweeper task ended abnormally");
			}
		}

		if let Some(pool) = self.pool.lock().await.take() {
			for _ in 0..pool.configured_workers() {
				if self.queue.send_stop().await.is_err() {
					break;
				}
			}
			pool.join().await;
		}

		info!(remaining_jobs = self.store.len(), "✅ Job queue drained");
	}
}

/// Map the record a sync caller ends up with to its outcome.
///
/// Records are only handed here once terminal; a live one counts as not finished within `waited`.
fn settle(job: JobRecord, waited: Duration) -> Result<JobRecord, QueueError> {
	match job.status {
		JobStatus::Complete => Ok(job),
		JobStatus::Error => Err(QueueError::JobFailed {
			job_id: job.id,
			message: job.failure.unwrap_or_default(),
		}),
		JobStatus::Queued | JobStatus::Processing => Err(QueueError::SyncTimeout { job_id: job.id, waited }),
	}
}

impl Drop for JobQueue {
	/// Best effort for queues dropped without [`JobQueue::shutdown`]: stop
	/// admitting and ask idle workers to exit without waiting for them.
	fn drop(&mut self) {
		let Some(pool) = self.pool.get_mut().take() else { return };

		self.queue.close();
		self.cancellation_token.cancel();
		let stopped = (0..pool.configured_workers()).filter(|_| self.queue.try_send_stop()).count();
		if stopped < pool.configured_workers() {
			warn!(stopped, workers = pool.configured_workers(), "⚠️ Job queue dropped while busy; some workers keep running");
		}
	}
}
