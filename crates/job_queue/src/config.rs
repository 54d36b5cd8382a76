use crate::error::QueueError;
use clap::Parser;
use std::time::Duration;

/// Tuning knobs for admission, workers, retention and the sync wait.
#[derive(Parser, Clone, Debug)]
pub struct QueueConfig {
	#[arg(long, env = "MAX_CONCURRENT_TRANSCRIPTIONS", default_value = "1", help = "Number of transcription workers")]
	pub max_workers: usize,

	#[arg(long, env = "MAX_QUEUE_SIZE", default_value = "5", help = "Jobs allowed to wait for a worker")]
	pub max_queue_size: usize,

	#[arg(
        long = "job-retention-secs",
        env = "JOB_RETENTION_SECS",
        default_value = "3600",
        value_parser = parse_duration,
        help = "How long finished jobs stay queryable"
    )]
	pub job_retention: Duration,

	#[arg(
        long = "sweep-interval-secs",
        env = "SWEEP_INTERVAL_SECS",
        default_value = "60",
        value_parser = parse_duration,
        help = "Period of the finished-job sweep"
    )]
	pub sweep_interval: Duration,

	#[arg(
        long = "sync-poll-interval-ms",
        env = "SYNC_POLL_INTERVAL_MS",
        default_value = "100",
        value_parser = parse_millis,
        help = "Upper bound between job store re-checks while a sync caller waits"
    )]
	pub sync_poll_interval: Duration,

	#[arg(
        long = "sync-timeout-secs",
        env = "SYNC_TIMEOUT_SECS",
        default_value = "300",
        value_parser = parse_duration,
        help = "Overall wait budget for synchronous submissions"
    )]
	pub sync_timeout: Duration,

	#[arg(
        long = "avg-processing-secs",
        env = "AVG_PROCESSING_SECS",
        default_value = "30",
        value_parser = parse_duration,
        help = "Estimated time per job used for retry hints"
    )]
	pub avg_processing_time: Duration,

	#[arg(
        long = "backoff-initial-secs",
        env = "BACKOFF_INITIAL_SECS",
        default_value = "5",
        value_parser = parse_duration,
        help = "First retry delay suggested to busy clients"
    )]
	pub backoff_initial: Duration,

	#[arg(long, env = "BACKOFF_MULTIPLIER", default_value = "2.0", help = "Growth factor of the suggested retry delay")]
	pub backoff_multiplier: f64,

	#[arg(
        long = "backoff-max-secs",
        env = "BACKOFF_MAX_SECS",
        default_value = "300",
        value_parser = parse_duration,
        help = "Ceiling of the suggested retry delay"
    )]
	pub backoff_max: Duration,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			max_workers: 1,
			max_queue_size: 5,
			job_retention: Duration::from_secs(3600),
			sweep_interval: Duration::from_secs(60),
			sync_poll_interval: Duration::from_millis(100),
			sync_timeout: Duration::from_secs(300),
			avg_processing_time: Duration::from_secs(30),
			backoff_initial: Duration::from_secs(5),
			backoff_multiplier: 2.0,
			backoff_max: Duration::from_secs(300),
		}
	}
}

impl QueueConfig {
	/// Small, fast settings for tests.
	#[must_use]
	pub fn test() -> Self {
		Self {
			max_workers: 1,
			max_queue_size: 3,
			job_retention: Duration::from_secs(60),
			sweep_interval: Duration::from_secs(1),
			sync_poll_interval: Duration::from_millis(20),
			sync_timeout: Duration::from_secs(10),
			..Self::default()
		}
	}

	/// # Errors
	/// Returns `QueueError::Config` naming the first invalid value.
	pub fn validate(&self) -> Result<(), QueueError> {
		if self.max_workers == 0 {
			return Err(QueueError::Config("max_workers must be at least 1".to_string()));
		}

		if self.max_queue_size == 0 {
			return Err(QueueError::Config("max_queue_size must be at least 1".to_string()));
		}

		if self.sweep_interval.is_zero() {
			return Err(QueueError::Config("sweep_interval must be greater than 0".to_string()));
		}

		if self.sync_poll_interval.is_zero() || self.sync_timeout.is_zero() {
			return Err(QueueError::Config("sync poll interval and timeout must be greater than 0".to_string()));
		}

		if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
			return Err(QueueError::Config("backoff_multiplier must be a finite number >= 1.0".to_string()));
		}

		Ok(())
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

fn parse_millis(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = QueueConfig::default();
		assert_eq!(config.max_workers, 1);
		assert_eq!(config.max_queue_size, 5);
		assert_eq!(config.job_retention, Duration::from_secs(3600));
		assert_eq!(config.sync_poll_interval, Duration::from_millis(100));
		assert_eq!(config.sync_timeout, Duration::from_secs(300));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_duration() {
		assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
		assert_eq!(parse_millis("250").unwrap(), Duration::from_millis(250));
		assert!(parse_duration("invalid").is_err());
	}

	#[test]
	fn test_config_parser() {
		let args = vec![
			"program",
			"--max-workers",
			"2",
			"--max-queue-size",
			"8",
			"--job-retention-secs",
			"120",
			"--sync-poll-interval-ms",
			"50",
			"--sync-timeout-secs",
			"30",
			"--backoff-multiplier",
			"1.5",
		];

		let config = QueueConfig::try_parse_from(args).unwrap();
		assert_eq!(config.max_workers, 2);
		assert_eq!(config.max_queue_size, 8);
		assert_eq!(config.job_retention, Duration::from_secs(120));
		assert_eq!(config.sync_poll_interval, Duration::from_millis(50));
		assert_eq!(config.sync_timeout, Duration::from_secs(30));
		assert!((config.backoff_multiplier - 1.5).abs() < f64::EPSILON);
	}

	#[test]
	fn test_validate_rejects_zero_capacity() {
		let config = QueueConfig { max_queue_size: 0, ..QueueConfig::default() };
		assert!(matches!(config.validate(), Err(QueueError::Config(_))));

		let config = QueueConfig { max_workers: 0, ..QueueConfig::default() };
		assert!(config.validate().is_err());

		let config = QueueConfig { backoff_multiplier: 0.5, ..QueueConfig::default() };
		assert!(config.validate().is_err());
	}
}
