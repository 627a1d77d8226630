use std::path::PathBuf;
use std::time::Duration;

use super::media::CaptureKind;

/// How the logical start time is moved forward on resume.
///
/// Resume shifts the start anchor by the paused interval minus `correction`,
/// so `now - start` reports the time spent recording. The correction only
/// affects the reported duration; the sample offset always grows by the
/// full paused interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeAnchor {
    pub correction: Duration,
}

/// Configuration for a capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfiguration {
    /// What to capture (default: the display).
    pub capture_kind: CaptureKind,

    /// Directory where recording files are written.
    pub output_directory: PathBuf,

    /// File name without extension. `None` uses a timestamped name.
    pub file_name: Option<String>,

    /// Capture system audio alongside video (default: true).
    pub capture_system_audio: bool,

    /// Record the microphone into its own track (default: false).
    /// Ignored for system-audio-only captures.
    pub record_microphone: bool,

    pub resume_anchor: ResumeAnchor,

    /// Write `<recording>.metadata.json` next to the file (default: false).
    pub write_metadata_sidecar: bool,

    /// SHA-256 the finished file (default: true).
    pub compute_checksum: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.output_directory.as_os_str().is_empty() {
            return Err("output directory must not be empty".into());
        }
        if let Some(name) = &self.file_name {
            if name.trim().is_empty() {
                return Err("file name must not be empty".into());
            }
            if name.contains(['/', '\\']) {
                return Err(format!("file name must not contain a path separator: {}", name));
            }
        }
        Ok(())
    }

    /// Whether the microphone gets a track in this configuration.
    pub fn records_microphone(&self) -> bool {
        self.record_microphone && !self.capture_kind.is_audio_only()
    }

    /// File stem for the next recording.
    pub fn file_stem(&self) -> String {
        match &self.file_name {
            Some(name) => name.clone(),
            None => format!("Recording at {}", chrono::Local::now().format("%Y-%m-%d %H.%M.%S")),
        }
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            capture_kind: CaptureKind::Display,
            output_directory: PathBuf::from("."),
            file_name: None,
            capture_system_audio: true,
            record_microphone: false,
            resume_anchor: ResumeAnchor::default(),
            write_metadata_sidecar: false,
            compute_checksum: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_file_names() {
        let blank = CaptureConfiguration {
            file_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());

        let nested = CaptureConfiguration {
            file_name: Some("a/b".into()),
            ..Default::default()
        };
        assert!(nested.validate().is_err());
    }

    #[test]
    fn microphone_ignored_for_system_audio_only() {
        let config = CaptureConfiguration {
            capture_kind: CaptureKind::SystemAudio,
            record_microphone: true,
            ..Default::default()
        };
        assert!(!config.records_microphone());
    }
}
