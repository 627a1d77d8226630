use serde::{Deserialize, Serialize};

/// Output track a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    SystemAudio,
    Microphone,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Video, TrackKind::SystemAudio, TrackKind::Microphone];

    pub fn is_audio(self) -> bool {
        !matches!(self, Self::Video)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::SystemAudio => "system-audio",
            Self::Microphone => "microphone",
        }
    }
}

/// What the capture stream is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Display,
    Window,
    Area,
    Application,
    /// System audio only. No video track and no muxed container: audio goes
    /// straight to a WAV file.
    SystemAudio,
}

impl CaptureKind {
    pub fn is_audio_only(self) -> bool {
        matches!(self, Self::SystemAudio)
    }

    pub fn has_video(self) -> bool {
        !self.is_audio_only()
    }
}

/// Platform permission required by a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ScreenCapture,
    Microphone,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScreenCapture => f.write_str("screen capture"),
            Self::Microphone => f.write_str("microphone"),
        }
    }
}

/// Sample encoding of an audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmEncoding {
    /// 16-bit signed integer, little-endian.
    Int16,
    /// 32-bit IEEE float, little-endian.
    Float32,
}

impl PcmEncoding {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Float32 => 32,
        }
    }
}

/// Format metadata attached to a sample by its producer.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatDescription {
    Video {
        width: u32,
        height: u32,
    },
    Audio {
        sample_rate: f64,
        channels: u16,
        encoding: PcmEncoding,
    },
}

/// Per-track pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStats {
    pub received: u64,
    pub forwarded: u64,
    pub dropped_paused: u64,
    pub dropped_malformed: u64,
    pub dropped_not_ready: u64,
    pub dropped_out_of_order: u64,
    pub dropped_finished: u64,
    pub dropped_before_session_start: u64,
    pub write_failures: u64,
}

impl TrackStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_paused
            + self.dropped_malformed
            + self.dropped_not_ready
            + self.dropped_out_of_order
            + self.dropped_finished
            + self.dropped_before_session_start
            + self.write_failures
    }
}

/// Diagnostics for debugging capture sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub video: TrackStats,
    pub system_audio: TrackStats,
    pub microphone: TrackStats,
    pub pause_count: u32,
}

impl SessionDiagnostics {
    pub fn track(&self, kind: TrackKind) -> &TrackStats {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::SystemAudio => &self.system_audio,
            TrackKind::Microphone => &self.microphone,
        }
    }

    pub fn track_mut(&mut self, kind: TrackKind) -> &mut TrackStats {
        match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::SystemAudio => &mut self.system_audio,
            TrackKind::Microphone => &mut self.microphone,
        }
    }
}
