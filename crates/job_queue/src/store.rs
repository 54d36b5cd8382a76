use crate::error::QueueError;
use crate::job::{JobId, JobInput, JobRecord, JobStatus, Transition};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

struct StoredJob {
	record: JobRecord,
	status_tx: watch::Sender<JobStatus>,
	/// A synchronous caller stopped waiting before the job finished
	abandoned: bool,
}

/// Per-status totals of the records currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
	pub queued: usize,
	pub processing: usize,
	pub complete: usize,
	pub error: usize,
}

impl StoreCounts {
	#[must_use]
	pub const fn total(&self) -> usize {
		self.queued + self.processing + self.complete + self.error
	}
}

/// Concurrent map of every known job, the single source of truth for status.
///
/// Each status change is a check-and-set under the entry's shard lock, so two
/// writers can never both move the same job out of the same state.
pub struct JobStore {
	jobs: DashMap<JobId, StoredJob>,
	seq_counter: AtomicU64,
}

impl Default for JobStore {
	fn default() -> Self {
		Self::new()
	}
}

impl JobStore {
	#[must_use]
	pub fn new() -> Self {
		Self {
			jobs: DashMap::new(),
			seq_counter: AtomicU64::new(0),
		}
	}

	/// Insert a fresh `queued` record for `input`.
	pub fn create(&self, input: JobInput) -> JobRecord {
		let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);

		loop {
			match self.jobs.entry(JobId::new()) {
				Entry::Occupied(_) => continue,
				Entry::Vacant(slot) => {
					let record = JobRecord::new(*slot.key(), seq, input);
					let (status_tx, _) = watch::channel(record.status);
					slot.insert(StoredJob {
						record: record.clone(),
						status_tx,
						abandoned: false,
					});
					return record;
				}
			}
		}
	}

	#[must_use]
	pub fn get(&self, id: &JobId) -> Option<JobRecord> {
		self.jobs.get(id).map(|job| job.record.clone())
	}

	/// Apply a worker's state change and wake anyone watching the job.
	///
	/// # Errors
	/// `NotFound` for unknown ids, `InvalidTransition` when the change would break
	/// `queued -> processing -> {complete | error}`.
	pub fn transition(&self, id: &JobId, transition: Transition) -> Result<JobRecord, QueueError> {
		let mut job = self.jobs.get_mut(id).ok_or(QueueError::NotFound(*id))?;
		let from = job.record.status;

		job.record
			.apply(transition, Utc::now())
			.map_err(|to| QueueError::InvalidTransition { job_id: *id, from, to })?;

		let status = job.record.status;
		job.status_tx.send_replace(status);

		Ok(job.record.clone())
	}

	/// Watch a job's status; `None` if the job is unknown.
	#[must_use]
	pub fn subscribe(&self, id: &JobId) -> Option<watch::Receiver<JobStatus>> {
		self.jobs.get(id).map(|job| job.status_tx.subscribe())
	}

	/// Flag that the synchronous caller of `id` gave up waiting.
	pub fn abandon(&self, id: &JobId) {
		if let Some(mut job) = self.jobs.get_mut(id) {
			job.abandoned = true;
		}
	}

	#[must_use]
	pub fn is_abandoned(&self, id: &JobId) -> bool {
		self.jobs.get(id).is_some_and(|job| job.abandoned)
	}

	/// Drop terminal records that finished more than `max_age` ago.
	///
	/// Queued and processing records are kept regardless of age.
	pub fn sweep(&self, max_age: Duration) -> usize {
		let Ok(max_age) = chrono::Duration::from_std(max_age) else {
			return 0;
		};
		let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
			return 0;
		};

		let mut removed = 0;
		self.jobs.retain(|_, job| {
			let expired = job.record.is_terminal() && job.record.completed_at.is_some_and(|at| at <= cutoff);
			if expired {
				removed += 1;
			}
			!expired
		});

		removed
	}

	#[must_use]
	pub fn counts(&self) -> StoreCounts {
		let mut counts = StoreCounts::default();
		for job in &self.jobs {
			match job.record.status {
				JobStatus::Queued => counts.queued += 1,
				JobStatus::Processing => counts.processing += 1,
				JobStatus::Complete => counts.complete += 1,
				JobStatus::Error => counts.error += 1,
			}
		}
		counts
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{TranscribeOptions, TranscriptionOutput};

	fn input() -> JobInput {
		JobInput::new("/tmp/sample.wav", "tiny", TranscribeOptions::default())
	}

	#[test]
	fn test_create_and_get() {
		let store = JobStore::new();
		let job = store.create(input());

		let fetched = store.get(&job.id).unwrap();
		assert_eq!(fetched.status, JobStatus::Queued);
		assert_eq!(fetched.input.model, "tiny");
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn test_ids_and_sequence_are_unique() {
		let store = JobStore::new();
		let a = store.create(input());
		let b = store.create(input());

		assert_ne!(a.id, b.id);
		assert!(b.seq > a.seq);
	}

	#[test]
	fn test_get_unknown_is_none() {
		let store = JobStore::new();
		assert!(store.get(&JobId::new()).is_none());
		assert!(matches!(store.transition(&JobId::new(), Transition::Start), Err(QueueError::NotFound(_))));
	}

	#[test]
	fn test_invalid_transition_leaves_record_unchanged() {
		let store = JobStore::new();
		let job = store.create(input());

		let err = store.transition(&job.id, Transition::Fail("early".into())).unwrap_err();
		assert!(matches!(
			err,
			QueueError::InvalidTransition {
				from: JobStatus::Queued,
				to: JobStatus::Error,
				..
			}
		));
		assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Queued);
	}

	#[test]
	fn test_subscribers_see_transitions() {
		let store = JobStore::new();
		let job = store.create(input());
		let rx = store.subscribe(&job.id).unwrap();

		store.transition(&job.id, Transition::Start).unwrap();
		assert_eq!(*rx.borrow(), JobStatus::Processing);

		store.transition(&job.id, Transition::Complete(TranscriptionOutput::from_text("ok", 1.0))).unwrap();
		assert_eq!(*rx.borrow(), JobStatus::Complete);
	}

	#[test]
	fn test_sweep_keeps_non_terminal_jobs() {
		let store = JobStore::new();
		let queued = store.create(input());
		let processing = store.create(input());
		let done = store.create(input());

		store.transition(&processing.id, Transition::Start).unwrap();
		store.transition(&done.id, Transition::Start).unwrap();
		store.transition(&done.id, Transition::Fail("engine exploded".into())).unwrap();

		let removed = store.sweep(Duration::ZERO);

		assert_eq!(removed, 1);
		assert!(store.get(&queued.id).is_some());
		assert!(store.get(&processing.id).is_some());
		assert!(store.get(&done.id).is_none());
	}

	#[test]
	fn test_sweep_respects_retention() {
		let store = JobStore::new();
		let done = store.create(input());
		store.transition(&done.id, Transition::Start).unwrap();
		store.transition(&done.id, Transition::Complete(TranscriptionOutput::default())).unwrap();

		assert_eq!(store.sweep(Duration::from_secs(3600)), 0);
		assert!(store.get(&done.id).is_some());
	}

	#[test]
	fn test_counts() {
		let store = JobStore::new();
		let a = store.create(input());
		store.create(input());
		store.transition(&a.id, Transition::Start).unwrap();

		let counts = store.counts();
		assert_eq!(counts.queued, 1);
		assert_eq!(counts.processing, 1);
		assert_eq!(counts.total(), 2);
	}

	#[test]
	fn test_abandon_flag() {
		let store = JobStore::new();
		let job = store.create(input());
		assert!(!store.is_abandoned(&job.id));
		store.abandon(&job.id);
		assert!(store.is_abandoned(&job.id));
	}
}
