use crate::engine::{TranscribeOptions, TranscriptionOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque job identifier, unique for the lifetime of a store.
///
/// Rendered as 32 lowercase hex digits; parsing also accepts the hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for JobId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

impl Serialize for JobId {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for JobId {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Queued,
	Processing,
	Complete,
	Error,
}

impl JobStatus {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Complete | Self::Error)
	}

	/// `queued -> processing -> {complete | error}`; nothing else.
	#[must_use]
	pub const fn can_transition_to(self, next: Self) -> bool {
		matches!((self, next), (Self::Queued, Self::Processing) | (Self::Processing, Self::Complete | Self::Error))
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Processing => "processing",
			Self::Complete => "complete",
			Self::Error => "error",
		}
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What a job runs: the audio to transcribe and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
	pub audio_path: PathBuf,
	pub model: String,
	pub options: TranscribeOptions,
	/// Remove `audio_path` once the job reaches a terminal state
	#[serde(skip)]
	pub owns_audio: bool,
}

impl JobInput {
	pub fn new(audio_path: impl Into<PathBuf>, model: impl Into<String>, options: TranscribeOptions) -> Self {
		Self {
			audio_path: audio_path.into(),
			model: model.into(),
			options,
			owns_audio: false,
		}
	}

	#[must_use]
	pub const fn owning_audio(mut self) -> Self {
		self.owns_audio = true;
		self
	}
}

/// A state change a worker applies to a record.
#[derive(Debug, Clone)]
pub enum Transition {
	Start,
	Complete(TranscriptionOutput),
	Fail(String),
}

impl Transition {
	#[must_use]
	pub const fn target(&self) -> JobStatus {
		match self {
			Self::Start => JobStatus::Processing,
			Self::Complete(_) => JobStatus::Complete,
			Self::Fail(_) => JobStatus::Error,
		}
	}
}

/// A single unit of transcription work and its lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
	pub id: JobId,
	/// Admission order, global across the store
	pub seq: u64,
	pub input: JobInput,
	pub status: JobStatus,
	pub result: Option<TranscriptionOutput>,
	pub failure: Option<String>,
	pub queued_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
	#[must_use]
	pub fn new(id: JobId, seq: u64, input: JobInput) -> Self {
		Self {
			id,
			seq,
			input,
			status: JobStatus::Queued,
			result: None,
			failure: None,
			queued_at: Utc::now(),
			started_at: None,
			completed_at: None,
		}
	}

	/// Apply `transition` if it is legal from the current status.
	///
	/// On rejection the record is left untouched and the attempted target is returned.
	pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Result<(), JobStatus> {
		let target = transition.target();
		if !self.status.can_transition_to(target) {
			return Err(target);
		}

		match transition {
			Transition::Start => self.started_at = Some(now),
			Transition::Complete(output) => {
				self.result = Some(output);
				self.completed_at = Some(now);
			}
			Transition::Fail(cause) => {
				let cause = if cause.trim().is_empty() { "unknown engine failure".to_string() } else { cause };
				self.failure = Some(cause);
				self.completed_at = Some(now);
			}
		}
		self.status = target;

		Ok(())
	}

	#[must_use]
	pub const fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Time spent waiting in the admission queue, if the job has started.
	#[must_use]
	pub fn queue_latency(&self) -> Option<chrono::Duration> {
		self.started_at.map(|started| started - self.queued_at)
	}

	/// Time spent inside the engine, if the job has finished.
	#[must_use]
	pub fn processing_time(&self) -> Option<chrono::Duration> {
		match (self.started_at, self.completed_at) {
			(Some(started), Some(completed)) => Some(completed - started),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record() -> JobRecord {
		JobRecord::new(JobId::new(), 0, JobInput::new("/tmp/a.wav", "tiny", TranscribeOptions::default()))
	}

	#[test]
	fn test_job_id_serializes_as_display_form() {
		let id = JobId::new();
		let json = serde_json::to_string(&id).unwrap();
		assert_eq!(json, format!("\"{id}\""));

		let hyphenated = id.0.hyphenated().to_string();
		assert_eq!(hyphenated.parse::<JobId>().unwrap(), id);
		assert!("nonexistent_job_123".parse::<JobId>().is_err());
	}

	#[test]
	fn test_new_record_is_queued_without_outcome() {
		let job = record();
		assert_eq!(job.status, JobStatus::Queued);
		assert!(job.result.is_none());
		assert!(job.failure.is_none());
		assert!(job.started_at.is_none());
		assert!(job.completed_at.is_none());
	}

	#[test]
	fn test_happy_path_sets_timestamps_once() {
		let mut job = record();
		job.apply(Transition::Start, Utc::now()).unwrap();
		assert_eq!(job.status, JobStatus::Processing);
		assert!(job.started_at.is_some());

		job.apply(Transition::Complete(TranscriptionOutput::from_text("hi", 1.0)), Utc::now()).unwrap();
		assert_eq!(job.status, JobStatus::Complete);
		assert!(job.completed_at.is_some());
		assert!(job.failure.is_none());
		assert_eq!(job.result.as_ref().unwrap().text, "hi");
		assert!(job.processing_time().is_some());
	}

	#[test]
	fn test_cannot_skip_processing() {
		let mut job = record();
		let err = job.apply(Transition::Complete(TranscriptionOutput::default()), Utc::now()).unwrap_err();
		assert_eq!(err, JobStatus::Complete);
		assert_eq!(job.status, JobStatus::Queued);
		assert!(job.result.is_none());
	}

	#[test]
	fn test_terminal_state_is_permanent() {
		let mut job = record();
		job.apply(Transition::Start, Utc::now()).unwrap();
		job.apply(Transition::Fail("boom".into()), Utc::now()).unwrap();
		let completed_at = job.completed_at;

		assert!(job.apply(Transition::Complete(TranscriptionOutput::default()), Utc::now()).is_err());
		assert!(job.apply(Transition::Start, Utc::now()).is_err());
		assert!(job.apply(Transition::Fail("again".into()), Utc::now()).is_err());

		assert_eq!(job.status, JobStatus::Error);
		assert_eq!(job.failure.as_deref(), Some("boom"));
		assert_eq!(job.completed_at, completed_at);
		assert!(job.result.is_none());
	}

	#[test]
	fn test_blank_failure_gets_a_message() {
		let mut job = record();
		job.apply(Transition::Start, Utc::now()).unwrap();
		job.apply(Transition::Fail("  ".into()), Utc::now()).unwrap();
		assert!(!job.failure.unwrap().trim().is_empty());
	}

	#[test]
	fn test_job_id_roundtrips_through_display() {
		let id = JobId::new();
		let parsed: JobId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
		assert!("not-a-job".parse::<JobId>().is_err());
	}
}
