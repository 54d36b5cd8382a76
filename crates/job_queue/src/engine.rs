use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inference task requested by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
	#[default]
	Transcribe,
	Translate,
}

impl Task {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Transcribe => "transcribe",
			Self::Translate => "translate",
		}
	}
}

impl std::str::FromStr for Task {
	type Err = EngineError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"transcribe" => Ok(Self::Transcribe),
			"translate" => Ok(Self::Translate),
			other => Err(EngineError::InvalidOptions(format!("unknown task '{other}'"))),
		}
	}
}

/// Decoding options passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscribeOptions {
	/// Language hint such as `"en"`; `None` lets the engine detect it
	pub language: Option<String>,
	pub task: Task,
	/// Initial prompt used to bias decoding
	pub initial_prompt: Option<String>,
	pub temperature: Option<f32>,
}

/// One timestamped chunk of transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
	pub id: usize,
	/// Start offset in seconds
	pub start: f64,
	/// End offset in seconds
	pub end: f64,
	pub text: String,
}

/// Output of a single successful engine call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionOutput {
	pub text: String,
	#[serde(default)]
	pub segments: Vec<Segment>,
	pub language: Option<String>,
	/// Audio duration in seconds
	pub duration: f64,
}

impl TranscriptionOutput {
	/// Output with a single segment spanning `duration`.
	#[must_use]
	pub fn from_text(text: impl Into<String>, duration: f64) -> Self {
		let text = text.into();
		Self {
			segments: vec![Segment {
				id: 0,
				start: 0.0,
				end: duration,
				text: text.clone(),
			}],
			text,
			language: None,
			duration,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("model '{0}' is not available")]
	ModelUnavailable(String),

	#[error("invalid options: {0}")]
	InvalidOptions(String),

	#[error("audio could not be decoded: {0}")]
	AudioFormat(String),

	#[error("transcription failed: {0}")]
	Failed(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Blocking speech-to-text backend.
///
/// Implementations are called from dedicated worker threads and may block for
/// as long as inference takes; the queue places no timeout on this call.
pub trait TranscriptionEngine: Send + Sync {
	/// Transcribe the audio at `audio_path` with the named model.
	///
	/// # Errors
	/// Any failure is recorded on the job as its terminal `error` cause.
	fn transcribe(&self, audio_path: &Path, model: &str, options: &TranscribeOptions) -> Result<TranscriptionOutput, EngineError>;

	/// Short identifier used in logs and health output.
	fn name(&self) -> &str;

	/// Whether `model` can be served without further setup.
	fn is_ready(&self, _model: &str) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_task_parse() {
		assert_eq!("Translate".parse::<Task>().unwrap(), Task::Translate);
		assert_eq!(" transcribe ".parse::<Task>().unwrap(), Task::Transcribe);
		assert!("summarize".parse::<Task>().is_err());
	}

	#[test]
	fn test_output_from_text_spans_duration() {
		let output = TranscriptionOutput::from_text("hello", 2.5);
		assert_eq!(output.segments.len(), 1);
		assert!((output.segments[0].end - 2.5).abs() < f64::EPSILON);
		assert_eq!(output.segments[0].text, "hello");
	}
}
