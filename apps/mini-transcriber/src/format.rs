use job_queue::{Segment, TranscriptionOutput};
use std::fmt::Write;
use std::str::FromStr;

/// Response rendering chosen with `?format=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
	#[default]
	Json,
	Txt,
	Srt,
	Vtt,
}

impl OutputFormat {
	#[must_use]
	pub const fn content_type(self) -> &'static str {
		match self {
			Self::Json => "application/json",
			Self::Txt => "text/plain; charset=utf-8",
			Self::Srt => "application/x-subrip; charset=utf-8",
			Self::Vtt => "text/vtt; charset=utf-8",
		}
	}

	/// Text body for non-JSON formats, `None` for JSON.
	#[must_use]
	pub fn render(self, output: &TranscriptionOutput) -> Option<String> {
		match self {
			Self::Json => None,
			Self::Txt => Some(to_text(output)),
			Self::Srt => Some(to_srt(output)),
			Self::Vtt => Some(to_vtt(output)),
		}
	}
}

impl FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"" | "json" => Ok(Self::Json),
			"txt" | "text" => Ok(Self::Txt),
			"srt" => Ok(Self::Srt),
			"vtt" | "webvtt" => Ok(Self::Vtt),
			other => Err(format!("unsupported format '{other}', expected json, txt, srt or vtt")),
		}
	}
}

#[must_use]
pub fn to_text(output: &TranscriptionOutput) -> String {
	let mut text = output.text.trim().to_string();
	text.push('\n');
	text
}

#[must_use]
pub fn to_srt(output: &TranscriptionOutput) -> String {
	let mut srt = String::new();
	for (index, segment) in cues(output).iter().enumerate() {
		let _ = writeln!(srt, "{}", index + 1);
		let _ = writeln!(srt, "{} --> {}", timestamp(segment.start, ','), timestamp(segment.end, ','));
		let _ = writeln!(srt, "{}\n", segment.text.trim());
	}
	srt
}

#[must_use]
pub fn to_vtt(output: &TranscriptionOutput) -> String {
	let mut vtt = String::from("WEBVTT\n\n");
	for segment in &cues(output) {
		let _ = writeln!(vtt, "{} --> {}", timestamp(segment.start, '.'), timestamp(segment.end, '.'));
		let _ = writeln!(vtt, "{}\n", segment.text.trim());
	}
	vtt
}

/// Segments to emit; a result without segments becomes one cue spanning the whole audio.
fn cues(output: &TranscriptionOutput) -> Vec<Segment> {
	if output.segments.is_empty() {
		vec![Segment {
			id: 0,
			start: 0.0,
			end: output.duration,
			text: output.text.clone(),
		}]
	} else {
		output.segments.clone()
	}
}

/// `HH:MM:SS<sep>mmm`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn timestamp(seconds: f64, separator: char) -> String {
	let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
	let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
	let (minutes, rest) = (rest / 60_000, rest % 60_000);
	let (secs, millis) = (rest / 1000, rest % 1000);
	format!("{hours:02}:{minutes:02}:{secs:02}{separator}{millis:03}")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> TranscriptionOutput {
		TranscriptionOutput {
			text: " Hello there. General Kenobi.".to_string(),
			segments: vec![
				Segment {
					id: 0,
					start: 0.0,
					end: 1.5,
					text: " Hello there.".to_string(),
				},
				Segment {
					id: 1,
					start: 1.5,
					end: 3725.042,
					text: " General Kenobi.".to_string(),
				},
			],
			language: Some("en".to_string()),
			duration: 3725.042,
		}
	}

	#[test]
	fn test_timestamp_formats() {
		assert_eq!(timestamp(0.0, ','), "00:00:00,000");
		assert_eq!(timestamp(1.5, '.'), "00:00:01.500");
		assert_eq!(timestamp(3725.042, ','), "01:02:05,042");
		assert_eq!(timestamp(-2.0, ','), "00:00:00,000");
	}

	#[test]
	fn test_srt_numbers_cues_from_one() {
		let srt = to_srt(&sample());
		assert_eq!(srt, "1\n00:00:00,000 --> 00:00:01,500\nHello there.\n\n2\n00:00:01,500 --> 01:02:05,042\nGeneral Kenobi.\n\n");
	}

	#[test]
	fn test_vtt_has_header_and_dot_separator() {
		let vtt = to_vtt(&sample());
		assert!(vtt.starts_with("WEBVTT\n\n00:00:00.000 --> 00:00:01.500\nHello there.\n\n"));
		assert!(vtt.contains("00:00:01.500 --> 01:02:05.042\nGeneral Kenobi."));
	}

	#[test]
	fn test_empty_segments_fall_back_to_single_cue() {
		let output = TranscriptionOutput {
			text: "just text".to_string(),
			duration: 2.0,
			..TranscriptionOutput::default()
		};
		assert_eq!(to_srt(&output), "1\n00:00:00,000 --> 00:00:02,000\njust text\n\n");
	}

	#[test]
	fn test_text_is_trimmed() {
		assert_eq!(to_text(&sample()), "Hello there. General Kenobi.\n");
	}

	#[test]
	fn test_parse_format() {
		assert_eq!("SRT".parse::<OutputFormat>().unwrap(), OutputFormat::Srt);
		assert_eq!("".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
		assert_eq!("webvtt".parse::<OutputFormat>().unwrap(), OutputFormat::Vtt);
		assert!("docx".parse::<OutputFormat>().is_err());
		assert_eq!(OutputFormat::Json.render(&sample()), None);
	}
}
