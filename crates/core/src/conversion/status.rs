//! Status line formats understood by [`CommandConverter`](super::CommandConverter).
//!
//! Each format turns one line of a converter's standard output into an
//! optional [`StatusUpdate`]. Lines that carry no status yield `Ok(None)`;
//! lines that look like status but cannot be read yield a [`ParseError`].

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::error::ParseError;
use super::types::StatusUpdate;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
});

static KEY_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([a-z_]+)=(.*)$").expect("valid key=value regex"));

/// Line protocol spoken by a converter's standard output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// ffmpeg `-progress` key/value output plus its `Duration:` banner.
    FfmpegProgress,
}

impl StatusFormat {
    /// Parses one line according to this format.
    pub fn parse(&self, line: &str) -> Result<Option<StatusUpdate>, ParseError> {
        match self {
            Self::Json => parse_json_line(line),
            Self::FfmpegProgress => parse_ffmpeg_line(line),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonStatusLine {
    duration: Option<f64>,
    progress: Option<f64>,
    #[serde(default)]
    finished: bool,
    error: Option<String>,
}

/// Parses a JSON status line such as `{"duration": 5.0, "progress": 1.0}`.
///
/// `{"error": "..."}` signals failure and `{"finished": true}` signals
/// completion; an error wins over `finished` on the same line.
pub fn parse_json_line(line: &str) -> Result<Option<StatusUpdate>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed: JsonStatusLine =
        serde_json::from_str(trimmed).map_err(|e| ParseError::new(line, e.to_string()))?;

    if let Some(error) = parsed.error {
        return Ok(Some(StatusUpdate {
            duration: parsed.duration,
            progress: parsed.progress,
            ..StatusUpdate::failed(error)
        }));
    }

    if parsed.finished {
        return Ok(Some(StatusUpdate {
            duration: parsed.duration,
            progress: parsed.progress,
            ..StatusUpdate::finished()
        }));
    }

    if parsed.duration.is_none() && parsed.progress.is_none() {
        return Ok(None);
    }

    Ok(Some(StatusUpdate {
        duration: parsed.duration,
        progress: parsed.progress,
        outcome: None,
    }))
}

/// Parses ffmpeg progress output.
///
/// Understands `Duration: HH:MM:SS.xx` banners, `out_time_ms=` (microseconds,
/// despite the name), `out_time=HH:MM:SS.xxxxxx` and `progress=end`.
pub fn parse_ffmpeg_line(line: &str) -> Result<Option<StatusUpdate>, ParseError> {
    if let Some(caps) = DURATION_RE.captures(line) {
        let secs = hms_to_secs(&caps[1], &caps[2], &caps[3])
            .ok_or_else(|| ParseError::new(line, "invalid duration timestamp"))?;
        return Ok(Some(StatusUpdate {
            duration: Some(secs),
            ..Default::default()
        }));
    }

    let Some(caps) = KEY_VALUE_RE.captures(line) else {
        return Ok(None);
    };
    let value = caps[2].trim();

    match &caps[1] {
        "out_time_ms" | "out_time_us" => {
            if value == "N/A" {
                return Ok(None);
            }
            let micros = value
                .parse::<f64>()
                .map_err(|e| ParseError::new(line, e.to_string()))?;
            Ok(Some(StatusUpdate::progress(None, (micros / 1_000_000.0).max(0.0))))
        }
        "out_time" => {
            if value == "N/A" {
                return Ok(None);
            }
            let parts: Vec<&str> = value.trim_start_matches('-').split(':').collect();
            let secs = match parts.as_slice() {
                [h, m, s] => hms_to_secs(h, m, s),
                _ => None,
            }
            .ok_or_else(|| ParseError::new(line, "invalid out_time timestamp"))?;
            Ok(Some(StatusUpdate::progress(None, secs)))
        }
        "progress" if value == "end" => Ok(Some(StatusUpdate::finished())),
        _ => Ok(None),
    }
}

fn hms_to_secs(hours: &str, minutes: &str, seconds: &str) -> Option<f64> {
    let h = hours.parse::<f64>().ok()?;
    let m = minutes.parse::<f64>().ok()?;
    let s = seconds.parse::<f64>().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}
