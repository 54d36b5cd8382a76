use crate::error::ApiError;
use crate::AppState;
use axum::{
	extract::{Path, State},
	response::Json,
};
use chrono::{DateTime, Utc};
use job_queue::{JobId, JobRecord, JobStatus, TranscriptionOutput};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
	job_id: JobId,
	status: JobStatus,
	queued_at: DateTime<Utc>,
	started_at: Option<DateTime<Utc>>,
	completed_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<TranscriptionOutput>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

impl From<JobRecord> for StatusResponse {
	fn from(job: JobRecord) -> Self {
		Self {
			job_id: job.id,
			status: job.status,
			queued_at: job.queued_at,
			started_at: job.started_at,
			completed_at: job.completed_at,
			result: job.result,
			error: job.failure,
		}
	}
}

#[axum::debug_handler]
#[instrument(name = "job_status", skip(state))]
pub async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<StatusResponse>, ApiError> {
	// ids that do not parse can never have been issued
	let job_id: JobId = job_id.parse().map_err(|_| ApiError::NotFound)?;
	let job = state.queue.query_status(&job_id)?;
	Ok(Json(job.into()))
}
