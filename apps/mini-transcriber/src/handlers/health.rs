use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	status: &'static str,
	version: &'static str,
	engine: String,
	default_model: String,
	model_loaded: bool,
	queue: QueueSection,
	concurrency: ConcurrencySection,
}

#[derive(Debug, Serialize)]
struct QueueSection {
	max_workers: usize,
	active_workers: usize,
	queued_jobs: usize,
	processing_jobs: usize,
	queue_capacity: usize,
	stored_jobs: usize,
}

#[derive(Debug, Serialize)]
struct ConcurrencySection {
	max_concurrent_transcriptions: usize,
	max_queue_size: usize,
}

#[axum::debug_handler]
#[instrument(name = "health", skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
	let queue = state.queue.query_health();
	let status = if state.queue.is_shutting_down() { "shutting_down" } else { "healthy" };

	let response = HealthResponse {
		status,
		version: env!("CARGO_PKG_VERSION"),
		engine: state.queue.engine_name().to_string(),
		default_model: state.config.default_model.clone(),
		model_loaded: state.engine.is_ready(&state.config.default_model),
		queue: QueueSection {
			max_workers: queue.configured_workers,
			active_workers: queue.active_workers,
			queued_jobs: queue.queued_jobs,
			processing_jobs: queue.processing_jobs,
			queue_capacity: queue.queue_capacity,
			stored_jobs: queue.stored_jobs,
		},
		concurrency: ConcurrencySection {
			max_concurrent_transcriptions: state.queue.config().max_workers,
			max_queue_size: state.queue.config().max_queue_size,
		},
	};

	(StatusCode::OK, Json(response))
}
