use crate::handlers::{health::health, status::job_status, transcribe::transcribe};
use crate::AppState;
use axum::{
	extract::FromRef,
	routing::{get, post},
	Router,
};

pub fn transcribe_routes<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	Router::new()
		.route("/transcribe", post(transcribe))
		.route("/transcribe/status/:job_id", get(job_status))
}

pub fn health_routes<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	Router::new().route("/health", get(health))
}
