use crate::error::QueueError;
use crate::job::JobId;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::mpsc;

/// What a worker can pull off the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMessage {
	Job(JobId),
	/// Exit the worker loop; one is sent per worker on shutdown
	Stop,
}

/// Producer side of the bounded FIFO between submitters and workers.
///
/// Uses a bounded MPSC channel so overload surfaces as an immediate `Full`
/// instead of a growing backlog.
pub struct AdmissionQueue {
	tx: mpsc::Sender<QueueMessage>,
	capacity: usize,
	/// `true` once admission has stopped; held for reading across reserve + commit
	closed: RwLock<bool>,
}

/// Consumer side, shared by every worker in the pool.
pub struct QueueReceiver {
	rx: Mutex<mpsc::Receiver<QueueMessage>>,
}

/// A reserved slot in the queue. Dropping it without `commit` releases the slot.
pub struct AdmissionPermit<'a> {
	permit: mpsc::Permit<'a, QueueMessage>,
	_gate: RwLockReadGuard<'a, bool>,
}

impl AdmissionPermit<'_> {
	/// Place `id` at the back of the queue.
	pub fn commit(self, id: JobId) {
		self.permit.send(QueueMessage::Job(id));
	}
}

/// Create a queue holding at most `capacity` pending jobs.
///
/// # Panics
/// Panics if `capacity` is zero.
#[must_use]
pub fn bounded(capacity: usize) -> (AdmissionQueue, QueueReceiver) {
	let (tx, rx) = mpsc::channel(capacity);

	(
		AdmissionQueue {
			tx,
			capacity,
			closed: RwLock::new(false),
		},
		QueueReceiver { rx: Mutex::new(rx) },
	)
}

impl AdmissionQueue {
	/// Hold a slot without blocking.
	///
	/// # Errors
	/// `Full` when `capacity` jobs are already waiting, `ShuttingDown` after `close`.
	pub fn try_reserve(&self) -> Result<AdmissionPermit<'_>, QueueError> {
		let gate = self.closed.read().unwrap_or_else(PoisonError::into_inner);
		if *gate {
			return Err(QueueError::ShuttingDown);
		}

		match self.tx.try_reserve() {
			Ok(permit) => Ok(AdmissionPermit { permit, _gate: gate }),
			Err(mpsc::error::TrySendError::Full(())) => Err(QueueError::Full),
			Err(mpsc::error::TrySendError::Closed(())) => Err(QueueError::ShuttingDown),
		}
	}

	/// Non-blocking enqueue of an already-created job.
	///
	/// # Errors
	/// Same conditions as [`AdmissionQueue::try_reserve`].
	pub fn try_enqueue(&self, id: JobId) -> Result<(), QueueError> {
		self.try_reserve()?.commit(id);
		Ok(())
	}

	/// Stop admitting. Waits for in-progress admissions to commit first, so
	/// every job admitted before this call sits ahead of any stop signal.
	pub fn close(&self) {
		*self.closed.write().unwrap_or_else(PoisonError::into_inner) = true;
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		*self.closed.read().unwrap_or_else(PoisonError::into_inner)
	}

	/// Queue a stop signal behind everything already admitted, waiting for room.
	///
	/// # Errors
	/// `ShuttingDown` if every worker is already gone.
	pub async fn send_stop(&self) -> Result<(), QueueError> {
		self.tx.send(QueueMessage::Stop).await.map_err(|_| QueueError::ShuttingDown)
	}

	/// Non-blocking variant of [`AdmissionQueue::send_stop`]; `false` if there was no room.
	pub fn try_send_stop(&self) -> bool {
		self.tx.try_send(QueueMessage::Stop).is_ok()
	}

	/// Jobs waiting for a worker (excludes jobs a worker has already taken).
	#[must_use]
	pub fn depth(&self) -> usize {
		self.tx.max_capacity() - self.tx.capacity()
	}

	#[must_use]
	pub const fn capacity(&self) -> usize {
		self.capacity
	}
}

impl QueueReceiver {
	/// Block the calling thread until a message arrives.
	///
	/// Must be called from a blocking context (a `spawn_blocking` worker),
	/// never from inside an async task. Returns `Stop` once every producer is gone.
	#[must_use]
	pub fn dequeue(&self) -> QueueMessage {
		let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
		rx.blocking_recv().unwrap_or(QueueMessage::Stop)
	}
}
