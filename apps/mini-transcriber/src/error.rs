use axum::body::Body;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use job_queue::{JobId, QueueError, RetryHint};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
	#[error("no file provided")]
	NoFile,

	#[error("{0}")]
	BadRequest(String),

	#[error("invalid base64 payload: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("invalid multipart body: {0}")]
	Multipart(#[from] axum::extract::multipart::MultipartError),

	#[error("job not found")]
	NotFound,

	#[error("service busy, retry in {}s", .0.retry_after_secs)]
	Busy(RetryHint),

	#[error("service is shutting down")]
	ShuttingDown,

	#[error("job {0} is still running")]
	Timeout(JobId),

	#[error("transcription failed: {message}")]
	TranscriptionFailed { job_id: JobId, message: String },

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("an internal server error occurred")]
	Internal(String),
}

impl ApiError {
	pub const fn status_code(&self) -> StatusCode {
		match self {
			Self::NoFile | Self::BadRequest(_) | Self::InvalidBase64(_) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
			Self::NotFound => StatusCode::NOT_FOUND,
			Self::Busy(_) | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
			Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
			Self::TranscriptionFailed { .. } | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl From<QueueError> for ApiError {
	fn from(err: QueueError) -> Self {
		match err {
			QueueError::NotFound(_) => Self::NotFound,
			QueueError::ShuttingDown => Self::ShuttingDown,
			QueueError::SyncTimeout { job_id, .. } => Self::Timeout(job_id),
			QueueError::JobFailed { job_id, message } => Self::TranscriptionFailed { job_id, message },
			other @ (QueueError::Full | QueueError::InvalidTransition { .. } | QueueError::Config(_) | QueueError::Metrics(_)) => Self::Internal(other.to_string()),
		}
	}
}

#[must_use]
pub fn status_url(job_id: &JobId) -> String {
	format!("/transcribe/status/{job_id}")
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response<Body> {
		let status = self.status_code();

		match self {
			Self::Busy(hint) => {
				let body = json!({
					"error": "service_busy",
					"message": format!("All {} queue slots are taken. Retry after {} seconds.", hint.queue_capacity, hint.retry_after_secs),
					"retry_after_seconds": hint.retry_after_secs,
					"queue_status": {
						"queued_jobs": hint.queue_depth,
						"queue_capacity": hint.queue_capacity,
						"active_workers": hint.active_workers,
					},
					"backoff_strategy": {
						"type": hint.backoff.strategy,
						"initial_delay_seconds": hint.backoff.initial_delay_secs,
						"multiplier": hint.backoff.multiplier,
						"max_delay_seconds": hint.backoff.max_delay_secs,
					},
				});
				let retry_after = HeaderValue::from(hint.retry_after_secs);
				(status, [(RETRY_AFTER, retry_after)], Json(body)).into_response()
			}
			Self::ShuttingDown => (status, Json(json!({ "error": "shutting_down" }))).into_response(),
			Self::Timeout(job_id) => (
				status,
				Json(json!({
					"error": "timeout",
					"job_id": job_id,
					"status_url": status_url(&job_id),
				})),
			)
				.into_response(),
			Self::TranscriptionFailed { job_id, message } => (
				status,
				Json(json!({
					"error": "transcription_failed",
					"job_id": job_id,
					"message": message,
				})),
			)
				.into_response(),
			Self::Io(ref e) => {
				tracing::error!(error = %e, "❌ I/O error while handling request");
				(status, Json(json!({ "error": "internal server error" }))).into_response()
			}
			Self::Internal(ref e) => {
				tracing::error!(error = %e, "❌ Internal error while handling request");
				(status, Json(json!({ "error": "internal server error" }))).into_response()
			}
			other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
		}
	}
}
