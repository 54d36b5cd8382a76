use job_queue::{EngineError, Segment, Task, TranscribeOptions, TranscriptionEngine, TranscriptionOutput};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs a whisper-compatible CLI per job and reads back its JSON output.
#[derive(Debug, Clone)]
pub struct CommandEngine {
	program: String,
}

/// Subset of the CLI's `--output_format json` document we rely on.
#[derive(Debug, Deserialize)]
struct CliOutput {
	#[serde(default)]
	text: String,
	#[serde(default)]
	segments: Vec<CliSegment>,
	language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CliSegment {
	#[serde(default)]
	id: usize,
	start: f64,
	end: f64,
	#[serde(default)]
	text: String,
}

impl CommandEngine {
	#[must_use]
	pub fn new(program: impl Into<String>) -> Self {
		Self { program: program.into() }
	}

	fn args(audio_path: &Path, model: &str, options: &TranscribeOptions, output_dir: &Path) -> Vec<OsString> {
		let mut args: Vec<OsString> = vec![
			audio_path.into(),
			"--model".into(),
			model.into(),
			"--output_format".into(),
			"json".into(),
			"--output_dir".into(),
			output_dir.into(),
		];

		if let Some(language) = &options.language {
			args.extend(["--language".into(), language.into()]);
		}
		if options.task != Task::default() {
			args.extend(["--task".into(), options.task.as_str().into()]);
		}
		if let Some(prompt) = &options.initial_prompt {
			args.extend(["--initial_prompt".into(), prompt.into()]);
		}
		if let Some(temperature) = options.temperature {
			args.extend(["--temperature".into(), temperature.to_string().into()]);
		}

		args
	}
}

impl TranscriptionEngine for CommandEngine {
	fn transcribe(&self, audio_path: &Path, model: &str, options: &TranscribeOptions) -> Result<TranscriptionOutput, EngineError> {
		let output_dir = tempfile::Builder::new().prefix("whisper-out-").tempdir()?;
		let args = Self::args(audio_path, model, options, output_dir.path());

		debug!(program = %self.program, ?args, "🔧 Launching transcription command");
		let started = Instant::now();

		let output = Command::new(&self.program)
			.args(&args)
			.output()
			.map_err(|e| EngineError::Failed(format!("could not launch '{}': {e}", self.program)))?;

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			let tail = stderr.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or("no output");
			warn!(program = %self.program, status = %output.status, "⚠️ Transcription command failed");
			return Err(EngineError::Failed(format!("{} exited with {}: {}", self.program, output.status, tail.trim())));
		}

		let stem = audio_path.file_stem().ok_or_else(|| EngineError::AudioFormat(format!("{} has no file name", audio_path.display())))?;
		let mut json_name = stem.to_os_string();
		json_name.push(".json");
		let json_path = output_dir.path().join(json_name);
		let raw = std::fs::read_to_string(&json_path).map_err(|e| EngineError::Failed(format!("missing output {}: {e}", json_path.display())))?;

		let parsed = parse_output(&raw)?;
		info!(
			elapsed_ms = started.elapsed().as_millis(),
			segments = parsed.segments.len(),
			language = parsed.language.as_deref().unwrap_or("unknown"),
			"✅ Transcription command finished"
		);
		Ok(parsed)
	}

	fn name(&self) -> &str {
		"command"
	}
}

fn parse_output(raw: &str) -> Result<TranscriptionOutput, EngineError> {
	let parsed: CliOutput = serde_json::from_str(raw).map_err(|e| EngineError::Failed(format!("unparsable transcription output: {e}")))?;

	let segments: Vec<Segment> = parsed
		.segments
		.into_iter()
		.map(|segment| Segment {
			id: segment.id,
			start: segment.start,
			end: segment.end,
			text: segment.text.trim().to_string(),
		})
		.collect();
	let duration = segments.last().map_or(0.0, |segment| segment.end);

	Ok(TranscriptionOutput {
		text: parsed.text.trim().to_string(),
		segments,
		language: parsed.language,
		duration,
	})
}
