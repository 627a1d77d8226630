use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::media::{CaptureKind, TrackKind};

/// Where a finished recording ended up.
///
/// System-audio-only captures that never received a sample produce no file,
/// so only the folder can be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Folder(PathBuf),
}

impl Destination {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Folder(path) => path,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Folder(_) => None,
        }
    }
}

/// Result returned when a capture session completes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub destination: Destination,
    /// Recorded time, excluding pauses.
    pub duration_secs: f64,
    pub paused_secs: f64,
    pub checksum: Option<String>,
    pub metadata: RecordingMetadata,
}

/// Metadata stored alongside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub capture_kind: CaptureKind,
    pub tracks: Vec<TrackKind>,
    pub duration_secs: f64,
    pub paused_secs: f64,
    pub pause_count: u32,
    pub file_path: Option<String>,
    pub checksum: Option<String>,
    pub created_at: String,
}

impl RecordingMetadata {
    pub fn new(
        capture_kind: CaptureKind,
        tracks: Vec<TrackKind>,
        duration_secs: f64,
        paused_secs: f64,
        pause_count: u32,
        destination: &Destination,
        checksum: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            capture_kind,
            tracks,
            duration_secs,
            paused_secs,
            pause_count,
            file_path: destination.file().map(|p| p.to_string_lossy().into_owned()),
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
