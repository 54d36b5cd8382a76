use crate::engine::TranscriptionEngine;
use crate::job::{JobId, JobInput, JobStatus, Transition};
use crate::metrics::QueueMetrics;
use crate::queue::{AdmissionQueue, QueueMessage, QueueReceiver};
use crate::store::JobStore;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything a worker thread needs, cloned once per worker.
#[derive(Clone)]
pub struct WorkerContext {
	pub store: Arc<JobStore>,
	pub queue: Arc<AdmissionQueue>,
	pub receiver: Arc<QueueReceiver>,
	pub engine: Arc<dyn TranscriptionEngine>,
	pub metrics: QueueMetrics,
}

/// Fixed set of blocking workers draining the admission queue.
pub struct WorkerPool {
	handles: Vec<JoinHandle<()>>,
	busy: Arc<AtomicUsize>,
}

impl WorkerPool {
	/// Spawn `num_workers` dedicated blocking workers.
	///
	/// Must be called from within a Tokio runtime.
	#[must_use]
	pub fn start(num_workers: usize, ctx: &WorkerContext) -> Self {
		let busy = Arc::new(AtomicUsize::new(0));

		info!(num_workers, engine = ctx.engine.name(), "🏭 Starting transcription workers");

		let handles = (0..num_workers)
			.map(|worker_id| {
				let ctx = ctx.clone();
				let busy = Arc::clone(&busy);
				tokio::task::spawn_blocking(move || worker_loop(worker_id, &ctx, &busy))
			})
			.collect();

		Self { handles, busy }
	}

	#[must_use]
	pub fn configured_workers(&self) -> usize {
		self.handles.len()
	}

	/// Shared handle to the busy counter, readable after the pool is moved.
	#[must_use]
	pub fn busy_counter(&self) -> Arc<AtomicUsize> {
		Arc::clone(&self.busy)
	}

	/// Wait for every worker to leave its loop.
	///
	/// Workers only exit on a stop signal, so callers queue one per worker first.
	pub async fn join(self) {
		for (worker_id, handle) in self.handles.into_iter().enumerate() {
			if let Err(e) = handle.await {
				error!(worker_id, error = %e, "❌ Worker thread terminated abnormally");
			}
		}
	}
}

/// Main worker loop, runs in a blocking context.
///
/// Blocks on the queue, runs one job at a time, never exits because of a job
/// failure. Leaves only on a stop signal.
fn worker_loop(worker_id: usize, ctx: &WorkerContext, busy: &AtomicUsize) {
	info!(worker_id, "🔄 Worker loop started, waiting for jobs...");

	loop {
		let job_id = match ctx.receiver.dequeue() {
			QueueMessage::Job(job_id) => job_id,
			QueueMessage::Stop => {
				info!(worker_id, "🛑 Worker shutting down (stop signal)");
				break;
			}
		};

		ctx.metrics.queue_depth.set(i64::try_from(ctx.queue.depth()).unwrap_or(i64::MAX));
		run_job(worker_id, job_id, ctx, busy);
	}

	info!(worker_id, "✅ Worker thread exiting");
}

/// Removes an upload the queue owns once the worker is done with the job, on every exit path.
struct OwnedAudio {
	job_id: JobId,
	path: Option<PathBuf>,
}

impl OwnedAudio {
	fn for_job(job_id: JobId, input: &JobInput) -> Self {
		Self {
			job_id,
			path: input.owns_audio.then(|| input.audio_path.clone()),
		}
	}
}

impl Drop for OwnedAudio {
	fn drop(&mut self) {
		let Some(path) = self.path.take() else { return };
		if let Err(e) = std::fs::remove_file(&path) {
			warn!(job_id = %self.job_id, path = %path.display(), error = %e, "⚠️ Could not remove job audio");
		}
	}
}

fn run_job(worker_id: usize, job_id: JobId, ctx: &WorkerContext, busy: &AtomicUsize) {
	let _audio = ctx.store.get(&job_id).map(|job| OwnedAudio::for_job(job_id, &job.input));

	let job = match ctx.store.transition(&job_id, Transition::Start) {
		Ok(job) => job,
		Err(e) => {
			error!(worker_id, %job_id, error = %e, "❌ Dequeued job could not be started");
			return;
		}
	};

	busy.fetch_add(1, Ordering::AcqRel);
	ctx.metrics.active_workers.inc();

	if let Some(wait) = job.queue_latency().and_then(|latency| latency.to_std().ok()) {
		ctx.metrics.queue_latency.observe(wait.as_secs_f64());
	}

	info!(
		worker_id,
		%job_id,
		seq = job.seq,
		model = %job.input.model,
		audio = %job.input.audio_path.display(),
		"📥 Processing job from queue"
	);

	let started = Instant::now();
	let outcome = catch_unwind(AssertUnwindSafe(|| ctx.engine.transcribe(&job.input.audio_path, &job.input.model, &job.input.options)));
	let elapsed = started.elapsed();
	ctx.metrics.processing_latency.observe(elapsed.as_secs_f64());

	let transition = match outcome {
		Ok(Ok(output)) => Transition::Complete(output),
		Ok(Err(e)) => Transition::Fail(e.to_string()),
		Err(payload) => Transition::Fail(format!("engine panicked: {}", panic_message(payload.as_ref()))),
	};

	match ctx.store.transition(&job_id, transition) {
		Ok(record) if record.status == JobStatus::Complete => {
			ctx.metrics.jobs_completed.inc();
			info!(worker_id, %job_id, elapsed_ms = elapsed.as_millis(), "✅ Job complete");
		}
		Ok(record) => {
			ctx.metrics.jobs_failed.inc();
			warn!(worker_id, %job_id, cause = record.failure.as_deref().unwrap_or_default(), "❌ Job failed");
		}
		Err(e) => error!(worker_id, %job_id, error = %e, "❌ Could not record job outcome"),
	}

	busy.fetch_sub(1, Ordering::AcqRel);
	ctx.metrics.active_workers.dec();

	if ctx.store.is_abandoned(&job_id) {
		ctx.metrics.late_completions.inc();
		info!(%job_id, "📭 Job finished after its caller stopped waiting; result kept until swept");
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{EngineError, TranscribeOptions, TranscriptionOutput};
	use crate::queue;
	use prometheus::Registry;
	use std::path::Path;

	struct EchoEngine;

	impl TranscriptionEngine for EchoEngine {
		fn transcribe(&self, _audio_path: &Path, _model: &str, _options: &TranscribeOptions) -> Result<TranscriptionOutput, EngineError> {
			Ok(TranscriptionOutput::from_text("hello", 1.0))
		}

		fn name(&self) -> &str {
			"echo"
		}
	}

	fn context() -> WorkerContext {
		let (queue, receiver) = queue::bounded(2);
		WorkerContext {
			store: Arc::new(JobStore::new()),
			queue: Arc::new(queue),
			receiver: Arc::new(receiver),
			engine: Arc::new(EchoEngine),
			metrics: QueueMetrics::new(&Registry::new()).unwrap(),
		}
	}

	fn owned_upload(dir: &tempfile::TempDir) -> (PathBuf, JobInput) {
		let path = dir.path().join("clip.wav");
		std::fs::write(&path, b"RIFF").unwrap();
		let input = JobInput::new(path.clone(), "tiny", TranscribeOptions::default()).owning_audio();
		(path, input)
	}

	#[test]
	fn test_owned_audio_removed_after_job() {
		let ctx = context();
		let dir = tempfile::tempdir().unwrap();
		let (path, input) = owned_upload(&dir);
		let job = ctx.store.create(input);

		run_job(0, job.id, &ctx, &AtomicUsize::new(0));

		assert_eq!(ctx.store.get(&job.id).unwrap().status, JobStatus::Complete);
		assert!(!path.exists());
	}

	#[test]
	fn test_owned_audio_removed_when_job_cannot_start() {
		let ctx = context();
		let dir = tempfile::tempdir().unwrap();
		let (path, input) = owned_upload(&dir);
		let job = ctx.store.create(input);
		ctx.store.transition(&job.id, Transition::Start).unwrap();

		let busy = AtomicUsize::new(0);
		run_job(0, job.id, &ctx, &busy);

		assert_eq!(ctx.store.get(&job.id).unwrap().status, JobStatus::Processing);
		assert_eq!(busy.load(Ordering::Acquire), 0);
		assert!(!path.exists());
	}

	#[test]
	fn test_panic_message_extracts_text() {
		let payload = catch_unwind(|| panic!("bad audio")).unwrap_err();
		assert_eq!(panic_message(payload.as_ref()), "bad audio");

		let owned = catch_unwind(|| panic!("{} frames", 3)).unwrap_err();
		assert_eq!(panic_message(owned.as_ref()), "3 frames");
	}
}
