use crate::config::Config;
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use base64::Engine as _;
use job_queue::{Task, TranscribeOptions};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;
use tracing::debug;

/// Audio spooled to disk plus the options that came with it.
#[derive(Debug)]
pub struct DecodedRequest {
	/// Deleted on drop unless ownership is handed to a job
	pub audio: TempPath,
	pub model: String,
	pub options: TranscribeOptions,
}

/// JSON alternative to multipart uploads.
#[derive(Debug, Default, Deserialize)]
pub struct Base64Body {
	pub b64: Option<String>,
	pub filename: Option<String>,
	pub model: Option<String>,
	pub language: Option<String>,
	pub task: Option<String>,
	pub prompt: Option<String>,
	pub temperature: Option<f32>,
}

#[derive(Debug, Default)]
struct RawFields {
	audio: Option<Bytes>,
	filename: Option<String>,
	model: Option<String>,
	language: Option<String>,
	task: Option<String>,
	prompt: Option<String>,
	temperature: Option<String>,
}

/// Pull the upload out of a multipart or base64-JSON request and spool it under `UPLOAD_DIR`.
///
/// # Errors
/// `NoFile` when no audio is present, `BadRequest`/`InvalidBase64`/`Multipart`
/// for malformed input, `Io` when the spool file cannot be written.
pub async fn decode_request(request: Request, config: &Config) -> Result<DecodedRequest, ApiError> {
	let content_type = request
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default()
		.to_ascii_lowercase();

	let fields = if content_type.starts_with("multipart/form-data") {
		let multipart = Multipart::from_request(request, &()).await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
		read_multipart(multipart).await?
	} else if content_type.starts_with("application/json") {
		let Json(body) = Json::<Base64Body>::from_request(request, &()).await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
		from_base64(body)?
	} else {
		return Err(ApiError::NoFile);
	};

	let (audio, suffix, model, options) = normalize(fields, &config.default_model)?;
	let upload_dir = config.upload_dir();

	debug!(bytes = audio.len(), %model, dir = %upload_dir.display(), "📦 Spooling upload");

	let audio = tokio::task::spawn_blocking(move || spool(&upload_dir, &suffix, &audio))
		.await
		.map_err(|e| ApiError::Internal(e.to_string()))??;

	Ok(DecodedRequest { audio, model, options })
}

async fn read_multipart(mut multipart: Multipart) -> Result<RawFields, ApiError> {
	let mut fields = RawFields::default();

	while let Some(field) = multipart.next_field().await? {
		let name = field.name().unwrap_or_default().to_string();
		match name.as_str() {
			"file" => {
				fields.filename = field.file_name().map(str::to_string);
				fields.audio = Some(field.bytes().await?);
			}
			"model" => fields.model = Some(field.text().await?),
			"language" => fields.language = Some(field.text().await?),
			"task" => fields.task = Some(field.text().await?),
			"prompt" | "initial_prompt" => fields.prompt = Some(field.text().await?),
			"temperature" => fields.temperature = Some(field.text().await?),
			other => debug!(field = other, "Ignoring unknown multipart field"),
		}
	}

	Ok(fields)
}

fn from_base64(body: Base64Body) -> Result<RawFields, ApiError> {
	let audio = match body.b64.as_deref().map(strip_data_uri) {
		Some(encoded) if !encoded.is_empty() => Some(Bytes::from(base64::engine::general_purpose::STANDARD.decode(encoded)?)),
		_ => None,
	};

	Ok(RawFields {
		audio,
		filename: body.filename,
		model: body.model,
		language: body.language,
		task: body.task,
		prompt: body.prompt,
		temperature: body.temperature.map(|t| t.to_string()),
	})
}

/// Accepts both bare base64 and `data:<mime>;base64,<payload>`.
fn strip_data_uri(encoded: &str) -> &str {
	let encoded = encoded.trim();
	match encoded.split_once(";base64,") {
		Some((prefix, payload)) if prefix.starts_with("data:") => payload,
		_ => encoded,
	}
}

fn normalize(fields: RawFields, default_model: &str) -> Result<(Bytes, String, String, TranscribeOptions), ApiError> {
	let audio = fields.audio.filter(|bytes| !bytes.is_empty()).ok_or(ApiError::NoFile)?;

	let model = non_empty(fields.model).unwrap_or_else(|| default_model.to_string());
	if !model.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')) {
		return Err(ApiError::BadRequest(format!("invalid model name '{model}'")));
	}

	let language = non_empty(fields.language).filter(|lang| !lang.eq_ignore_ascii_case("auto"));

	let task = match non_empty(fields.task) {
		Some(task) => task.parse::<Task>().map_err(|e| ApiError::BadRequest(e.to_string()))?,
		None => Task::default(),
	};

	let temperature = match non_empty(fields.temperature) {
		Some(raw) => {
			let value: f32 = raw.parse().map_err(|_| ApiError::BadRequest(format!("invalid temperature '{raw}'")))?;
			if !(0.0..=1.0).contains(&value) {
				return Err(ApiError::BadRequest("temperature must be between 0 and 1".to_string()));
			}
			Some(value)
		}
		None => None,
	};

	let options = TranscribeOptions {
		language,
		task,
		initial_prompt: non_empty(fields.prompt),
		temperature,
	};

	Ok((audio, upload_suffix(fields.filename.as_deref()), model, options))
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Keep a short alphanumeric extension so decoders can sniff the container.
fn upload_suffix(filename: Option<&str>) -> String {
	filename
		.and_then(|name| Path::new(name).extension())
		.and_then(|ext| ext.to_str())
		.filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
		.map(|ext| format!(".{}", ext.to_ascii_lowercase()))
		.unwrap_or_default()
}

fn spool(dir: &Path, suffix: &str, audio: &[u8]) -> Result<TempPath, ApiError> {
	let mut file = tempfile::Builder::new().prefix("upload-").suffix(suffix).tempfile_in(dir)?;
	file.write_all(audio)?;
	file.flush()?;
	Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fields_with_audio() -> RawFields {
		RawFields {
			audio: Some(Bytes::from_static(b"RIFF....WAVEfmt ")),
			filename: Some("meeting.WAV".to_string()),
			..RawFields::default()
		}
	}

	#[test]
	fn test_missing_or_empty_audio_is_no_file() {
		assert!(matches!(normalize(RawFields::default(), "tiny"), Err(ApiError::NoFile)));

		let empty = RawFields {
			audio: Some(Bytes::new()),
			..RawFields::default()
		};
		assert!(matches!(normalize(empty, "tiny"), Err(ApiError::NoFile)));
	}

	#[test]
	fn test_defaults_applied() {
		let (audio, suffix, model, options) = normalize(fields_with_audio(), "tiny").unwrap();
		assert_eq!(&audio[..4], b"RIFF");
		assert_eq!(suffix, ".wav");
		assert_eq!(model, "tiny");
		assert_eq!(options, TranscribeOptions::default());
	}

	#[test]
	fn test_options_are_parsed() {
		let fields = RawFields {
			model: Some(" base.en ".to_string()),
			language: Some("fr".to_string()),
			task: Some("translate".to_string()),
			prompt: Some("Glossary: Kubernetes".to_string()),
			temperature: Some("0.2".to_string()),
			..fields_with_audio()
		};
		let (_, _, model, options) = normalize(fields, "tiny").unwrap();
		assert_eq!(model, "base.en");
		assert_eq!(options.language.as_deref(), Some("fr"));
		assert_eq!(options.task, Task::Translate);
		assert_eq!(options.initial_prompt.as_deref(), Some("Glossary: Kubernetes"));
		assert_eq!(options.temperature, Some(0.2));
	}

	#[test]
	fn test_auto_language_means_detect() {
		let fields = RawFields {
			language: Some("auto".to_string()),
			..fields_with_audio()
		};
		assert_eq!(normalize(fields, "tiny").unwrap().3.language, None);
	}

	#[test]
	fn test_rejects_bad_options() {
		let traversal = RawFields {
			model: Some("../../etc/passwd".to_string()),
			..fields_with_audio()
		};
		assert!(matches!(normalize(traversal, "tiny"), Err(ApiError::BadRequest(_))));

		let hot = RawFields {
			temperature: Some("1.5".to_string()),
			..fields_with_audio()
		};
		assert!(matches!(normalize(hot, "tiny"), Err(ApiError::BadRequest(_))));

		let task = RawFields {
			task: Some("summarize".to_string()),
			..fields_with_audio()
		};
		assert!(matches!(normalize(task, "tiny"), Err(ApiError::BadRequest(_))));
	}

	#[test]
	fn test_base64_body_with_data_uri() {
		let body = Base64Body {
			b64: Some("data:audio/wav;base64,UklGRg==".to_string()),
			..Base64Body::default()
		};
		let fields = from_base64(body).unwrap();
		assert_eq!(fields.audio.unwrap().as_ref(), b"RIFF");
	}

	#[test]
	fn test_invalid_base64_is_rejected() {
		let body = Base64Body {
			b64: Some("not base64!!".to_string()),
			..Base64Body::default()
		};
		assert!(matches!(from_base64(body), Err(ApiError::InvalidBase64(_))));
	}

	#[test]
	fn test_upload_suffix() {
		assert_eq!(upload_suffix(Some("a.MP3")), ".mp3");
		assert_eq!(upload_suffix(Some("noext")), "");
		assert_eq!(upload_suffix(Some("weird.ext$")), "");
		assert_eq!(upload_suffix(None), "");
	}

	#[test]
	fn test_spool_writes_file_removed_on_drop() {
		let dir = tempfile::tempdir().unwrap();
		let path = spool(dir.path(), ".wav", b"abc").unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"abc");

		let kept = path.to_path_buf();
		drop(path);
		assert!(!kept.exists());
	}
}
