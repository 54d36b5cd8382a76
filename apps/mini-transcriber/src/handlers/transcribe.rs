use crate::decode::decode_request;
use crate::error::{status_url, ApiError};
use crate::format::OutputFormat;
use crate::AppState;
use axum::{
	extract::{Query, Request, State},
	http::{header::CONTENT_TYPE, StatusCode},
	response::{IntoResponse, Json, Response},
};
use job_queue::{JobId, JobInput, JobQueue, JobRecord, QueueError, Segment, SubmitMode, SubmitOutcome};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument, warn};

#[derive(Debug, Default, Deserialize)]
pub struct TranscribeParams {
	#[serde(rename = "async")]
	pub async_mode: Option<String>,
	pub format: Option<String>,
}

impl TranscribeParams {
	fn mode(&self) -> SubmitMode {
		match self.async_mode.as_deref().map(str::trim) {
			Some(flag) if ["true", "1", "yes", "on"].iter().any(|t| flag.eq_ignore_ascii_case(t)) => SubmitMode::Async,
			_ => SubmitMode::Sync,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
	job_id: JobId,
	text: String,
	segments: Vec<Segment>,
	language: Option<String>,
	/// Audio duration in seconds
	duration: f64,
	/// Wall-clock processing time in seconds
	duration_s: f64,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
	job_id: JobId,
	status: &'static str,
	status_url: String,
}

#[axum::debug_handler]
#[instrument(name = "transcribe", skip(state, request), fields(mode = tracing::field::Empty))]
pub async fn transcribe(State(state): State<AppState>, Query(params): Query<TranscribeParams>, request: Request) -> Result<Response, ApiError> {
	let format: OutputFormat = params.format.as_deref().unwrap_or_default().parse().map_err(ApiError::BadRequest)?;
	let mode = params.mode();
	tracing::Span::current().record("mode", tracing::field::debug(mode));

	if state.queue.is_shutting_down() {
		return Err(ApiError::ShuttingDown);
	}

	let upload = decode_request(request, &state.config).await?;
	// the worker deletes the file once the job is admitted
	let audio_path = upload.audio.keep().map_err(|e| ApiError::Io(e.error))?;
	let input = JobInput::new(audio_path, upload.model, upload.options).owning_audio();

	match enqueue(&state.queue, input, mode).await? {
		SubmitOutcome::Complete(job) => Ok(render(&job, format)),
		SubmitOutcome::Queued(job) => {
			info!(job_id = %job.id, "📨 Accepted async transcription");
			let body = AcceptedResponse {
				job_id: job.id,
				status: "queued",
				status_url: status_url(&job.id),
			};
			Ok((StatusCode::ACCEPTED, Json(body)).into_response())
		}
		SubmitOutcome::Busy(hint) => Err(ApiError::Busy(hint)),
	}
}

/// Submit an owned upload, deleting it again when the queue turns it away.
async fn enqueue(queue: &JobQueue, input: JobInput, mode: SubmitMode) -> Result<SubmitOutcome, ApiError> {
	let audio_path = input.audio_path.clone();
	let outcome = queue.submit(input, mode).await;

	if matches!(outcome, Ok(SubmitOutcome::Busy(_)) | Err(QueueError::ShuttingDown)) {
		discard(&audio_path);
	}

	outcome.map_err(ApiError::from)
}

fn render(job: &JobRecord, format: OutputFormat) -> Response {
	let output = job.result.clone().unwrap_or_default();

	if let Some(body) = format.render(&output) {
		return (StatusCode::OK, [(CONTENT_TYPE, format.content_type())], body).into_response();
	}

	let duration_s = job.processing_time().and_then(|elapsed| elapsed.to_std().ok()).map_or(0.0, |elapsed| (elapsed.as_secs_f64() * 1000.0).round() / 1000.0);

	let body = TranscribeResponse {
		job_id: job.id,
		text: output.text,
		segments: output.segments,
		language: output.language,
		duration: output.duration,
		duration_s,
	};
	(StatusCode::OK, Json(body)).into_response()
}

/// Remove an upload that never made it into the queue.
fn discard(path: &Path) {
	if let Err(e) = std::fs::remove_file(path) {
		warn!(path = %path.display(), error = %e, "⚠️ Could not remove rejected upload");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use job_queue::{EngineError, QueueConfig, TranscribeOptions, TranscriptionEngine, TranscriptionOutput};
	use prometheus::Registry;
	use std::sync::Arc;

	struct SilentEngine;

	impl TranscriptionEngine for SilentEngine {
		fn transcribe(&self, _audio_path: &Path, _model: &str, _options: &TranscribeOptions) -> Result<TranscriptionOutput, EngineError> {
			Ok(TranscriptionOutput::default())
		}

		fn name(&self) -> &str {
			"silent"
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_upload_refused_during_shutdown_is_removed() {
		let queue = JobQueue::start(QueueConfig::test(), Arc::new(SilentEngine), &Registry::new()).unwrap();
		queue.shutdown().await;

		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("upload-late.wav");
		std::fs::write(&path, b"RIFF").unwrap();
		let input = JobInput::new(path.clone(), "tiny", TranscribeOptions::default()).owning_audio();

		let result = enqueue(&queue, input, SubmitMode::Async).await;
		assert!(matches!(result, Err(ApiError::ShuttingDown)));
		assert!(!path.exists());
		assert_eq!(queue.query_health().stored_jobs, 0);
	}

	#[test]
	fn test_async_flag_parsing() {
		let params = |flag: Option<&str>| TranscribeParams {
			async_mode: flag.map(str::to_string),
			format: None,
		};
		assert_eq!(params(Some("true")).mode(), SubmitMode::Async);
		assert_eq!(params(Some("1")).mode(), SubmitMode::Async);
		assert_eq!(params(Some("TRUE")).mode(), SubmitMode::Async);
		assert_eq!(params(Some("false")).mode(), SubmitMode::Sync);
		assert_eq!(params(None).mode(), SubmitMode::Sync);
	}
}
