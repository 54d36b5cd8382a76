use job_queue::{EngineError, Segment, Task, TranscribeOptions, TranscriptionEngine, TranscriptionOutput};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// In-process whisper.cpp engine with one loaded context per model name.
pub struct WhisperEngine {
	models_dir: PathBuf,
	threads: i32,
	models: Mutex<HashMap<String, Arc<WhisperContext>>>,
}

impl WhisperEngine {
	#[must_use]
	pub fn new(models_dir: impl Into<PathBuf>, threads: i32) -> Self {
		Self {
			models_dir: models_dir.into(),
			threads,
			models: Mutex::new(HashMap::new()),
		}
	}

	fn model_path(&self, model: &str) -> PathBuf {
		self.models_dir.join(format!("ggml-{model}.bin"))
	}

	/// Load `model` on first use and keep it for later jobs.
	fn context(&self, model: &str) -> Result<Arc<WhisperContext>, EngineError> {
		let mut models = self.models.lock().map_err(|_| EngineError::Failed("model cache lock poisoned".to_string()))?;
		if let Some(ctx) = models.get(model) {
			return Ok(Arc::clone(ctx));
		}

		let path = self.model_path(model);
		if !path.is_file() {
			return Err(EngineError::ModelUnavailable(model.to_string()));
		}
		let path_str = path.to_str().ok_or_else(|| EngineError::ModelUnavailable(model.to_string()))?;

		info!("🔄 Loading Whisper model from {}...", path.display());
		let start = Instant::now();
		let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default()).map_err(|e| EngineError::Failed(format!("failed to load model '{model}': {e}")))?;
		info!(load_time_ms = start.elapsed().as_millis(), threads = self.threads, %model, "✅ Whisper model loaded");

		let ctx = Arc::new(ctx);
		models.insert(model.to_string(), Arc::clone(&ctx));
		Ok(ctx)
	}
}

impl TranscriptionEngine for WhisperEngine {
	#[allow(clippy::cast_precision_loss)]
	fn transcribe(&self, audio_path: &Path, model: &str, options: &TranscribeOptions) -> Result<TranscriptionOutput, EngineError> {
		let ctx = self.context(model)?;
		let (audio, duration) = decode_wav(audio_path)?;

		let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
		params.set_n_threads(self.threads);
		params.set_translate(options.task == Task::Translate);
		params.set_language(options.language.as_deref());
		params.set_print_special(false);
		params.set_print_progress(false);
		params.set_print_realtime(false);
		params.set_print_timestamps(false);
		if let Some(prompt) = options.initial_prompt.as_deref() {
			params.set_initial_prompt(prompt);
		}
		if let Some(temperature) = options.temperature {
			params.set_temperature(temperature);
		}

		let mut state = ctx.create_state().map_err(|e| EngineError::Failed(format!("failed to create Whisper state: {e}")))?;

		info!(audio_samples = audio.len(), duration_secs = format!("{duration:.2}"), "🧠 Running Whisper model...");
		let started = Instant::now();
		state.full(params, &audio).map_err(|e| EngineError::Failed(format!("transcription failed: {e}")))?;

		let elapsed = started.elapsed().as_secs_f64();
		info!(realtime_factor = format!("{:.2}x", elapsed / duration.max(f64::EPSILON)), "✅ Whisper run completed");

		let mut segments = Vec::new();
		for i in 0..state.full_n_segments() {
			let Some(segment) = state.get_segment(i) else { continue };
			let Ok(text) = segment.to_str() else { continue };
			let text = text.trim();
			if text.is_empty() {
				continue;
			}
			segments.push(Segment {
				id: segments.len(),
				start: segment.start_timestamp() as f64 / 100.0,
				end: segment.end_timestamp() as f64 / 100.0,
				text: text.to_string(),
			});
		}

		if segments.is_empty() {
			warn!("⚠️ No segments extracted - audio may be silence");
		}

		let language = options
			.language
			.clone()
			.or_else(|| state.full_lang_id_from_state().ok().and_then(whisper_rs::get_lang_str).map(str::to_string));

		Ok(TranscriptionOutput {
			text: segments.iter().map(|segment| segment.text.as_str()).collect::<Vec<_>>().join(" "),
			segments,
			language,
			duration,
		})
	}

	fn name(&self) -> &str {
		"whisper"
	}

	fn is_ready(&self, model: &str) -> bool {
		self.models.lock().is_ok_and(|models| models.contains_key(model)) || self.model_path(model).is_file()
	}
}

/// Read a PCM or float WAV file as mono 16 kHz samples plus its duration in seconds.
#[allow(clippy::cast_precision_loss)]
fn decode_wav(path: &Path) -> Result<(Vec<f32>, f64), EngineError> {
	let mut reader = hound::WavReader::open(path).map_err(|e| EngineError::AudioFormat(e.to_string()))?;
	let spec = reader.spec();

	let samples: Vec<f32> = match spec.sample_format {
		hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>(),
		hound::SampleFormat::Int => {
			let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
			reader.samples::<i32>().map(|sample| sample.map(|v| v as f32 / scale)).collect::<Result<_, _>>()
		}
	}
	.map_err(|e| EngineError::AudioFormat(e.to_string()))?;

	let mono = downmix(&samples, spec.channels);
	let duration = mono.len() as f64 / f64::from(spec.sample_rate.max(1));

	Ok((resample_linear(&mono, spec.sample_rate, WHISPER_SAMPLE_RATE), duration))
}

/// Average interleaved channels into one.
#[allow(clippy::cast_precision_loss)]
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
	if channels <= 1 {
		return samples.to_vec();
	}
	let channels = usize::from(channels);
	samples.chunks(channels).map(|frame| frame.iter().sum::<f32>() / frame.len() as f32).collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
	if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
		return samples.to_vec();
	}

	let ratio = f64::from(from_rate) / f64::from(to_rate);
	let output_len = (samples.len() as f64 / ratio) as usize;

	(0..output_len)
		.map(|i| {
			let position = i as f64 * ratio;
			let index = position as usize;
			let frac = (position - index as f64) as f32;
			let current = samples.get(index).copied().unwrap_or(0.0);
			let next = samples.get(index + 1).copied().unwrap_or(current);
			current + (next - current) * frac
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_downmix_averages_frames() {
		assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
		assert_eq!(downmix(&[0.25, 0.75], 1), vec![0.25, 0.75]);
	}

	#[test]
	fn test_resample_halves_length() {
		let input: Vec<f32> = (0..32).map(|i| i as f32).collect();
		let output = resample_linear(&input, 32_000, 16_000);
		assert_eq!(output.len(), 16);
		assert!((output[1] - 2.0).abs() < f32::EPSILON);
	}

	#[test]
	fn test_resample_interpolates_upwards() {
		let output = resample_linear(&[0.0, 1.0], 8_000, 16_000);
		assert_eq!(output.len(), 4);
		assert!((output[1] - 0.5).abs() < f32::EPSILON);
	}

	#[test]
	fn test_decode_16bit_stereo_wav() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tone.wav");
		let spec = hound::WavSpec {
			channels: 2,
			sample_rate: 16_000,
			bits_per_sample: 16,
			sample_format: hound::SampleFormat::Int,
		};
		let mut writer = hound::WavWriter::create(&path, spec).unwrap();
		for _ in 0..16_000 {
			writer.write_sample(i16::MAX).unwrap();
			writer.write_sample(0_i16).unwrap();
		}
		writer.finalize().unwrap();

		let (samples, duration) = decode_wav(&path).unwrap();
		assert_eq!(samples.len(), 16_000);
		assert!((duration - 1.0).abs() < 1e-9);
		assert!((samples[0] - 0.5).abs() < 0.001);
	}

	#[test]
	fn test_missing_model_is_unavailable() {
		let dir = tempfile::tempdir().unwrap();
		let engine = WhisperEngine::new(dir.path(), 1);
		assert!(!engine.is_ready("tiny"));
		assert!(matches!(engine.context("tiny"), Err(EngineError::ModelUnavailable(_))));
	}
}
