pub mod command;
#[cfg(feature = "whisper")]
pub mod whisper;

use crate::config::{Config, EngineKind};
use job_queue::{EngineError, TranscriptionEngine};
use std::sync::Arc;
use tracing::info;

pub use command::CommandEngine;
#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;

/// Build the engine named by `ENGINE`.
///
/// # Errors
/// `ModelUnavailable` when the whisper engine is requested without its models
/// directory or without the `whisper` feature compiled in.
pub fn build_engine(config: &Config) -> Result<Arc<dyn TranscriptionEngine>, EngineError> {
	match config.engine {
		EngineKind::Command => {
			info!(program = %config.whisper_cmd, "🔧 Using command engine");
			Ok(Arc::new(CommandEngine::new(config.whisper_cmd.clone())))
		}
		EngineKind::Whisper => build_whisper(config),
	}
}

#[cfg(feature = "whisper")]
fn build_whisper(config: &Config) -> Result<Arc<dyn TranscriptionEngine>, EngineError> {
	let models_dir = config.whisper_models_path.clone().ok_or_else(|| EngineError::ModelUnavailable("WHISPER_MODELS_PATH is not set".to_string()))?;
	info!(models_dir = %models_dir.display(), threads = config.whisper_threads, "🔧 Using in-process Whisper engine");
	Ok(Arc::new(WhisperEngine::new(models_dir, config.whisper_threads)))
}

#[cfg(not(feature = "whisper"))]
fn build_whisper(_config: &Config) -> Result<Arc<dyn TranscriptionEngine>, EngineError> {
	Err(EngineError::ModelUnavailable("whisper engine (rebuild with --features whisper)".to_string()))
}
