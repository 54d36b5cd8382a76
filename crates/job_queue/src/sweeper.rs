use crate::metrics::QueueMetrics;
use crate::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically drop finished jobs older than `retention`, independent of traffic.
pub fn spawn_sweeper(store: Arc<JobStore>, retention: Duration, interval: Duration, metrics: QueueMetrics, cancellation_token: CancellationToken) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// first tick fires immediately
		ticker.tick().await;

		loop {
			tokio::select! {
				() = cancellation_token.cancelled() => {
					debug!("🧹 Sweeper stopped");
					break;
				}
				_ = ticker.tick() => {
					let removed = store.sweep(retention);
					if removed > 0 {
						metrics.jobs_swept.inc_by(removed as u64);
						info!(removed, remaining = store.len(), "🧹 Swept finished jobs");
					}
				}
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{TranscribeOptions, TranscriptionOutput};
	use crate::job::{JobInput, Transition};
	use prometheus::Registry;

	#[tokio::test]
	async fn test_sweeper_removes_expired_jobs_on_tick() {
		let store = Arc::new(JobStore::new());
		let metrics = QueueMetrics::new(&Registry::new()).unwrap();
		let token = CancellationToken::new();

		let done = store.create(JobInput::new("/tmp/a.wav", "tiny", TranscribeOptions::default()));
		let waiting = store.create(JobInput::new("/tmp/b.wav", "tiny", TranscribeOptions::default()));
		store.transition(&done.id, Transition::Start).unwrap();
		store.transition(&done.id, Transition::Complete(TranscriptionOutput::default())).unwrap();

		let handle = spawn_sweeper(Arc::clone(&store), Duration::ZERO, Duration::from_millis(20), metrics.clone(), token.clone());

		tokio::time::sleep(Duration::from_millis(150)).await;
		token.cancel();
		handle.await.unwrap();

		assert!(store.get(&done.id).is_none());
		assert!(store.get(&waiting.id).is_some());
		assert_eq!(metrics.jobs_swept.get(), 1);
	}
}
