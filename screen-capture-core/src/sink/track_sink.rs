use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::media::TrackKind;
use crate::models::sample::Sample;
use crate::traits::container_writer::ContainerWriter;

/// Output endpoint of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSink {
    kind: TrackKind,
    finished: bool,
    last_presentation: Option<Duration>,
    appended: u64,
}

impl TrackSink {
    fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            finished: false,
            last_presentation: None,
            appended: 0,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_presentation(&self) -> Option<Duration> {
        self.last_presentation
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }
}

/// What happened to a sample handed to [`TrackSinkSet::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The set has no sink for this track.
    NoSuchTrack,
    Finished,
    NotReady,
    /// Audio that arrived before the first video frame opened the session.
    SessionNotStarted,
    /// Sample has no timing entries.
    Untimed,
    /// Presentation time not strictly after the previous one on this track.
    OutOfOrder { last: Duration, got: Duration },
    Failed(CaptureError),
}

/// The per-track sinks of one muxed recording, plus the container writer
/// that backs them.
///
/// The writer session opens at the first video frame so audio never leads
/// video; a container without a video track opens on any first sample.
pub struct TrackSinkSet {
    writer: Option<Box<dyn ContainerWriter>>,
    sinks: Vec<TrackSink>,
    session_started: bool,
}

impl TrackSinkSet {
    pub fn new(writer: Box<dyn ContainerWriter>, tracks: &[TrackKind]) -> Self {
        let mut sinks: Vec<TrackSink> = Vec::with_capacity(tracks.len());
        for &kind in tracks {
            if !sinks.iter().any(|s| s.kind == kind) {
                sinks.push(TrackSink::new(kind));
            }
        }
        Self {
            writer: Some(writer),
            sinks,
            session_started: false,
        }
    }

    pub fn tracks(&self) -> Vec<TrackKind> {
        self.sinks.iter().map(|s| s.kind).collect()
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.sink(kind).is_some()
    }

    pub fn sink(&self, kind: TrackKind) -> Option<&TrackSink> {
        self.sinks.iter().find(|s| s.kind == kind)
    }

    /// Whether the writer has been handed off for finalization.
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn session_started(&self) -> bool {
        self.session_started
    }

    /// Forward an already-adjusted sample to its track.
    pub fn append(&mut self, kind: TrackKind, sample: &Sample) -> AppendOutcome {
        let has_video = self.has_track(TrackKind::Video);
        let Some(index) = self.sinks.iter().position(|s| s.kind == kind) else {
            return AppendOutcome::NoSuchTrack;
        };
        let Some(writer) = self.writer.as_mut() else {
            return AppendOutcome::Finished;
        };
        let sink = &mut self.sinks[index];
        if sink.finished {
            return AppendOutcome::Finished;
        }
        if !writer.is_ready_for_more_data(kind) {
            return AppendOutcome::NotReady;
        }
        let Some(pts) = sample.presentation_time() else {
            return AppendOutcome::Untimed;
        };
        if let Some(last) = sink.last_presentation {
            if pts <= last {
                return AppendOutcome::OutOfOrder { last, got: pts };
            }
        }

        if !self.session_started {
            if has_video && kind != TrackKind::Video {
                return AppendOutcome::SessionNotStarted;
            }
            if let Err(e) = writer.start_session(pts) {
                return AppendOutcome::Failed(e);
            }
            log::debug!("writer session started at {:?} by {} track", pts, kind.as_str());
            self.session_started = true;
        }

        match writer.append(kind, sample) {
            Ok(()) => {
                sink.last_presentation = Some(pts);
                sink.appended += 1;
                AppendOutcome::Appended
            }
            Err(e) => AppendOutcome::Failed(e),
        }
    }

    /// Mark every sink finished and hand back the writer for finalization.
    ///
    /// Later appends return [`AppendOutcome::Finished`]. Returns `None` if
    /// the writer was already taken.
    pub fn finish_all(&mut self) -> Option<Box<dyn ContainerWriter>> {
        let mut writer = self.writer.take()?;
        for sink in &mut self.sinks {
            if !sink.finished {
                sink.finished = true;
                writer.mark_finished(sink.kind);
            }
        }
        Some(writer)
    }
}
