use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::media::{CaptureKind, TrackKind};
use crate::models::sample::Sample;
use crate::timing::clock::Clock;

/// Callback invoked for every sample a stream produces on one track.
///
/// Fires on a platform-owned thread. Must not block.
pub type SampleCallback = Arc<dyn Fn(Sample) + Send + Sync + 'static>;

/// One callback per track kind the capture stream can produce.
#[derive(Clone)]
pub struct StreamHandlers {
    pub video: Option<SampleCallback>,
    pub system_audio: Option<SampleCallback>,
}

impl StreamHandlers {
    pub fn for_track(&self, kind: TrackKind) -> Option<&SampleCallback> {
        match kind {
            TrackKind::Video => self.video.as_ref(),
            TrackKind::SystemAudio => self.system_audio.as_ref(),
            TrackKind::Microphone => None,
        }
    }
}

/// A running capture stream. Dropping it without `stop_capture` is allowed
/// but leaves shutdown timing to the platform.
pub trait StreamHandle: Send {
    fn stop_capture(&mut self) -> Result<(), CaptureError>;
}

/// Platform screen/window/application capture.
///
/// Implementations stamp samples with the same clock they return from
/// `clock()`; pause/resume bookkeeping is measured against it.
pub trait CaptureSource: Send + Sync {
    /// Host clock sample timestamps are expressed on.
    fn clock(&self) -> Arc<dyn Clock>;

    /// Whether screen capture is allowed. Also required for
    /// system-audio-only captures.
    fn screen_permission(&self) -> bool;

    /// Whether at least one surface of `kind` can be captured.
    fn has_capturable_content(&self, kind: CaptureKind) -> bool;

    /// Start streaming, delivering samples through `handlers`.
    fn start_stream(&mut self, kind: CaptureKind, handlers: StreamHandlers) -> Result<Box<dyn StreamHandle>, CaptureError>;
}
