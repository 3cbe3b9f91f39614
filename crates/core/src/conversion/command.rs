//! Converter driven by a command template from configuration.

use std::path::{Path, PathBuf};

use super::config::ConverterConfig;
use super::error::{LaunchError, ParseError};
use super::process::resolve_executable;
use super::traits::ConverterSpec;
use super::types::{MediaSource, StatusUpdate};

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// A [`ConverterSpec`] built from a [`ConverterConfig`].
#[derive(Debug, Clone)]
pub struct CommandConverter {
    name: String,
    config: ConverterConfig,
}

impl CommandConverter {
    pub fn new(name: impl Into<String>, config: ConverterConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }
}

impl ConverterSpec for CommandConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        &self.config.extension
    }

    fn executable(&self) -> Result<PathBuf, LaunchError> {
        resolve_executable(&self.config.executable)
    }

    fn arguments(&self, source: &MediaSource, output: &Path) -> Vec<String> {
        let input = source.path().to_string_lossy();
        let output = output.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }

    fn process_status_line(
        &self,
        _source: &MediaSource,
        line: &str,
    ) -> Result<Option<StatusUpdate>, ParseError> {
        self.config.status_format.parse(line)
    }
}

/// Whether an argument template will receive the output path.
pub fn template_mentions_output(args: &[String]) -> bool {
    args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::StatusFormat;

    #[test]
    fn test_arguments_substitute_placeholders() {
        let converter = CommandConverter::new(
            "ogg",
            ConverterConfig::new("ffmpeg", "ogg").with_args([
                "-i",
                "{input}",
                "-c:a",
                "libvorbis",
                "file:{output}",
            ]),
        );

        let args = converter.arguments(
            &MediaSource::new("/music/song.flac"),
            Path::new("/tmp/song.ogg.part"),
        );
        assert_eq!(
            args,
            vec![
                "-i",
                "/music/song.flac",
                "-c:a",
                "libvorbis",
                "file:/tmp/song.ogg.part"
            ]
        );
    }

    #[test]
    fn test_status_lines_use_configured_format() {
        let converter = CommandConverter::new(
            "ffmpeg",
            ConverterConfig::new("ffmpeg", "webm").with_status_format(StatusFormat::FfmpegProgress),
        );
        let source = MediaSource::new("/in.mkv");

        let update = converter
            .process_status_line(&source, "out_time_ms=2000000")
            .unwrap()
            .unwrap();
        assert_eq!(update.progress, Some(2.0));
        assert!(converter
            .process_status_line(&source, r#"{"progress": 1.0}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_executable_is_launch_error() {
        let converter = CommandConverter::new(
            "missing",
            ConverterConfig::new("/definitely/not/here/convert", "out"),
        );
        // Absolute paths are returned as-is; the runner checks existence.
        assert_eq!(
            converter.executable().unwrap(),
            PathBuf::from("/definitely/not/here/convert")
        );

        let bare = CommandConverter::new(
            "bare",
            ConverterConfig::new("cadence-no-such-program-xyz", "out"),
        );
        assert!(matches!(
            bare.executable(),
            Err(LaunchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_template_mentions_output() {
        assert!(template_mentions_output(&["{output}".to_string()]));
        assert!(!template_mentions_output(&["{input}".to_string()]));
    }
}
