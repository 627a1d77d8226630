use std::sync::Arc;
use std::time::Duration;

use super::media::{FormatDescription, PcmEncoding};

/// Timing of one entry in a sample.
///
/// Timestamps are measured on the session's host clock. Audio samples
/// usually carry no decode timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTiming {
    pub duration: Option<Duration>,
    pub presentation: Duration,
    pub decode: Option<Duration>,
}

impl SampleTiming {
    pub fn at(presentation: Duration) -> Self {
        Self {
            duration: None,
            presentation,
            decode: None,
        }
    }
}

/// One unit of media produced by a capture source.
///
/// The payload is opaque to the core and shared between copies, so
/// re-timing a sample never copies media data.
#[derive(Debug, Clone)]
pub struct Sample {
    format: Option<FormatDescription>,
    timing: Vec<SampleTiming>,
    payload: Arc<[u8]>,
}

impl Sample {
    pub fn new(format: Option<FormatDescription>, timing: Vec<SampleTiming>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            format,
            timing,
            payload: payload.into(),
        }
    }

    /// Wrap interleaved f32 PCM frames, e.g. from a microphone tap.
    pub fn from_pcm_f32(samples: &[f32], sample_rate: f64, channels: u16, host_time: Duration) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels as usize;
        // Degenerate rates leave the entry without a duration.
        let duration = if sample_rate > 0.0 {
            Duration::try_from_secs_f64(frames as f64 / sample_rate).ok()
        } else {
            None
        };

        let mut payload = Vec::with_capacity(samples.len() * 4);
        for &sample in samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }

        Self {
            format: Some(FormatDescription::Audio {
                sample_rate,
                channels,
                encoding: PcmEncoding::Float32,
            }),
            timing: vec![SampleTiming {
                duration,
                presentation: host_time,
                decode: None,
            }],
            payload: payload.into(),
        }
    }

    pub fn format(&self) -> Option<&FormatDescription> {
        self.format.as_ref()
    }

    pub fn timing(&self) -> &[SampleTiming] {
        &self.timing
    }

    /// Presentation timestamp of the first timing entry.
    pub fn presentation_time(&self) -> Option<Duration> {
        self.timing.first().map(|t| t.presentation)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether `other` shares this sample's payload buffer.
    pub fn shares_payload_with(&self, other: &Sample) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Copy of this sample with a new timing table and the same payload.
    pub fn with_timing(&self, timing: Vec<SampleTiming>) -> Self {
        Self {
            format: self.format.clone(),
            timing,
            payload: Arc::clone(&self.payload),
        }
    }
}
