use axum::{extract::DefaultBodyLimit, routing::get, Router};
use job_queue::{JobQueue, TranscriptionEngine};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod format;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod routes;

pub use config::{Config, EngineKind};
pub use error::ApiError;

/// Shared handles for every request
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub queue: Arc<JobQueue>,
	pub engine: Arc<dyn TranscriptionEngine>,
}

impl AppState {
	#[must_use]
	pub fn new(config: Arc<Config>, queue: Arc<JobQueue>, engine: Arc<dyn TranscriptionEngine>) -> Self {
		Self { config, queue, engine }
	}
}

/// Full HTTP surface with body limits, tracing and request metrics.
pub fn build_router(state: AppState) -> Router {
	let max_body = state.config.max_upload_bytes();

	Router::new()
		.merge(routes::transcribe_routes())
		.merge(routes::health_routes())
		.route("/metrics", get(metrics::metrics_handler))
		.layer(
			ServiceBuilder::new()
				.layer(axum::middleware::from_fn(metrics::metrics_middleware))
				.layer(TraceLayer::new_for_http())
				.layer(DefaultBodyLimit::disable())
				.layer(RequestBodyLimitLayer::new(max_body)),
		)
		.with_state(state)
}

/// Shut the queue down, waiting at most `limit` for admitted jobs.
///
/// Returns `false` when workers were still busy at the deadline. Engine calls
/// cannot be interrupted, so those threads keep running after this returns.
pub async fn drain_queue(queue: &JobQueue, limit: Duration) -> bool {
	tokio::time::timeout(limit, queue.shutdown()).await.is_ok()
}
