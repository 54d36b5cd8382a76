use clap::{Parser, ValueEnum};
use job_queue::QueueConfig;
use std::path::PathBuf;

/// Inference backend selected at startup.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EngineKind {
	/// Shell out to a whisper-compatible CLI
	#[default]
	Command,
	/// In-process whisper.cpp bindings (needs the `whisper` feature)
	Whisper,
}

#[derive(Parser, Clone, Debug)]
#[command(name = "mini-transcriber")]
#[command(about = "Queue-backed audio transcription over HTTP", long_about = None)]
pub struct Config {
	/// Use JSON formatting for tracing
	#[arg(long, env = "LOG_JSON", default_value = "false")]
	pub log_json: bool,

	/// Log filter, e.g. `info,job_queue=debug`
	#[arg(long, env = "RUST_LOG")]
	pub rust_log: Option<String>,

	/// Server host
	#[arg(long, env = "HOST", default_value = "127.0.0.1")]
	pub host: String,

	/// Server port
	#[arg(long, env = "PORT", default_value = "8080")]
	pub port: u16,

	/// Transcription backend
	#[arg(long, env = "ENGINE", value_enum, default_value_t = EngineKind::Command)]
	pub engine: EngineKind,

	/// Program invoked by the command engine
	#[arg(long, env = "WHISPER_CMD", default_value = "whisper")]
	pub whisper_cmd: String,

	/// Directory holding `ggml-<model>.bin` files for the whisper engine
	#[arg(long, env = "WHISPER_MODELS_PATH")]
	pub whisper_models_path: Option<PathBuf>,

	/// Number of threads for Whisper processing
	#[arg(long, env = "WHISPER_THREADS", default_value = "2")]
	pub whisper_threads: i32,

	/// Model used when a request does not name one
	#[arg(long, env = "DEFAULT_MODEL", default_value = "tiny")]
	pub default_model: String,

	/// Where uploads are spooled before a worker picks them up
	#[arg(long, env = "UPLOAD_DIR")]
	pub upload_dir: Option<PathBuf>,

	/// Maximum request body size in MB
	#[arg(long, env = "MAX_UPLOAD_MB", default_value = "50")]
	pub max_upload_mb: usize,

	#[command(flatten)]
	pub queue: QueueConfig,
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		self.queue.validate().map_err(|e| e.to_string())?;

		if self.whisper_threads < 1 {
			return Err("whisper_threads must be at least 1".to_string());
		}

		if self.max_upload_mb == 0 {
			return Err("max_upload_mb must be greater than 0".to_string());
		}

		if self.default_model.trim().is_empty() {
			return Err("default_model must not be empty".to_string());
		}

		if self.engine == EngineKind::Whisper {
			if !cfg!(feature = "whisper") {
				return Err("ENGINE=whisper requires building with the `whisper` feature".to_string());
			}
			if self.whisper_models_path.is_none() {
				return Err("ENGINE=whisper requires WHISPER_MODELS_PATH".to_string());
			}
		}

		Ok(())
	}

	#[must_use]
	pub fn upload_dir(&self) -> PathBuf {
		self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
	}

	#[must_use]
	pub const fn max_upload_bytes(&self) -> usize {
		self.max_upload_mb.saturating_mul(1024 * 1024)
	}

	#[must_use]
	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = Config::try_parse_from(["mini-transcriber"]).unwrap();
		assert_eq!(config.port, 8080);
		assert_eq!(config.default_model, "tiny");
		assert_eq!(config.engine, EngineKind::Command);
		assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
		assert_eq!(config.queue.max_workers, 1);
		assert_eq!(config.queue.max_queue_size, 5);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_queue_flags_are_flattened() {
		let config = Config::try_parse_from(["mini-transcriber", "--max-workers", "2", "--max-queue-size", "8", "--port", "9000"]).unwrap();
		assert_eq!(config.queue.max_workers, 2);
		assert_eq!(config.queue.max_queue_size, 8);
		assert_eq!(config.bind_addr(), "127.0.0.1:9000");
	}

	#[test]
	fn test_whisper_engine_needs_models_path() {
		let config = Config::try_parse_from(["mini-transcriber", "--engine", "whisper"]).unwrap();
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_rejects_zero_workers() {
		let config = Config::try_parse_from(["mini-transcriber", "--max-workers", "0"]).unwrap();
		assert!(config.validate().is_err());
	}
}
