//! In-memory collaborators for exercising sessions without a platform.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::media::{CaptureKind, FormatDescription, TrackKind};
use crate::models::recording_result::RecordingResult;
use crate::models::sample::{Sample, SampleTiming};
use crate::models::state::CaptureState;
use crate::session::capture::CaptureSession;
use crate::session::shutdown::FinalizeCompletion;
use crate::timing::clock::{Clock, ManualClock};
use crate::traits::audio_input::{AudioInputEngine, MicrophoneCallback};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_source::{CaptureSource, StreamHandle, StreamHandlers};
use crate::traits::container_writer::{ContainerWriter, ContainerWriterFactory};

pub fn frame_at(pts: Duration) -> Sample {
    Sample::new(
        Some(FormatDescription::Video { width: 4, height: 2 }),
        vec![SampleTiming {
            duration: Some(Duration::from_nanos(33_333_333)),
            presentation: pts,
            decode: Some(pts),
        }],
        vec![0u8; 32],
    )
}

pub fn audio_at(pts: Duration) -> Sample {
    Sample::from_pcm_f32(&[0.0; 4], 48000.0, 2, pts)
}

// --- Container writer ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCall {
    StartSession(Duration),
    Append(TrackKind, Duration),
    MarkFinished(TrackKind),
    FinishWriting,
}

#[derive(Debug, Clone)]
pub enum FinalizeBehavior {
    Succeed,
    SucceedAfter(Duration),
    Fail(String),
    /// Drop the completion without firing it.
    Abandon,
}

struct WriterState {
    calls: Vec<WriterCall>,
    ready: bool,
    fail_appends: bool,
    finalize: FinalizeBehavior,
    finalized: bool,
    dropped: bool,
}

/// Shared view of everything a [`FakeWriter`] was asked to do.
#[derive(Clone)]
pub struct WriterLog {
    state: Arc<Mutex<WriterState>>,
}

impl WriterLog {
    fn new(finalize: FinalizeBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                calls: Vec::new(),
                ready: true,
                fail_appends: false,
                finalize,
                finalized: false,
                dropped: false,
            })),
        }
    }

    pub fn calls(&self) -> Vec<WriterCall> {
        self.state.lock().calls.clone()
    }

    pub fn appended(&self, kind: TrackKind) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                WriterCall::Append(k, pts) if k == kind => Some(pts),
                _ => None,
            })
            .collect()
    }

    pub fn finalized(&self) -> bool {
        self.state.lock().finalized
    }

    pub fn dropped(&self) -> bool {
        self.state.lock().dropped
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    pub fn fail_appends(&self, fail: bool) {
        self.state.lock().fail_appends = fail;
    }
}

pub struct FakeWriter {
    log: WriterLog,
}

impl FakeWriter {
    pub fn new() -> Self {
        Self::with_finalize(FinalizeBehavior::Succeed)
    }

    pub fn with_finalize(behavior: FinalizeBehavior) -> Self {
        Self {
            log: WriterLog::new(behavior),
        }
    }

    fn sharing(log: &WriterLog) -> Self {
        Self { log: log.clone() }
    }

    pub fn log(&self) -> WriterLog {
        self.log.clone()
    }

    pub fn set_ready(&self, ready: bool) {
        self.log.set_ready(ready);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.log.fail_appends(fail);
    }

    fn record(&self, call: WriterCall) {
        self.log.state.lock().calls.push(call);
    }
}

impl ContainerWriter for FakeWriter {
    fn start_session(&mut self, at: Duration) -> Result<(), CaptureError> {
        self.record(WriterCall::StartSession(at));
        Ok(())
    }

    fn is_ready_for_more_data(&self, _kind: TrackKind) -> bool {
        self.log.state.lock().ready
    }

    fn append(&mut self, kind: TrackKind, sample: &Sample) -> Result<(), CaptureError> {
        if self.log.state.lock().fail_appends {
            return Err(CaptureError::WriterFailed("append rejected".into()));
        }
        let pts = sample.presentation_time().unwrap_or_default();
        self.record(WriterCall::Append(kind, pts));
        Ok(())
    }

    fn mark_finished(&mut self, kind: TrackKind) {
        self.record(WriterCall::MarkFinished(kind));
    }

    fn finish_writing(&mut self, completion: FinalizeCompletion) {
        self.record(WriterCall::FinishWriting);
        let behavior = self.log.state.lock().finalize.clone();
        match behavior {
            FinalizeBehavior::Succeed => {
                self.log.state.lock().finalized = true;
                completion.complete(Ok(()));
            }
            FinalizeBehavior::SucceedAfter(delay) => {
                let log = self.log.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    log.state.lock().finalized = true;
                    completion.complete(Ok(()));
                });
            }
            FinalizeBehavior::Fail(reason) => completion.complete(Err(CaptureError::WriterFailed(reason))),
            FinalizeBehavior::Abandon => drop(completion),
        }
    }
}

impl Drop for FakeWriter {
    fn drop(&mut self) {
        self.log.state.lock().dropped = true;
    }
}

/// Hands out [`FakeWriter`]s that all report into one [`WriterLog`].
pub struct FakeWriterFactory {
    log: WriterLog,
    created: Arc<Mutex<Vec<(PathBuf, Vec<TrackKind>)>>>,
    fail_create: bool,
}

impl FakeWriterFactory {
    pub fn new(finalize: FinalizeBehavior) -> Self {
        Self {
            log: WriterLog::new(finalize),
            created: Arc::new(Mutex::new(Vec::new())),
            fail_create: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new(FinalizeBehavior::Succeed)
        }
    }

    pub fn log(&self) -> WriterLog {
        self.log.clone()
    }

    pub fn created(&self) -> Arc<Mutex<Vec<(PathBuf, Vec<TrackKind>)>>> {
        Arc::clone(&self.created)
    }
}

impl ContainerWriterFactory for FakeWriterFactory {
    fn file_extension(&self) -> &str {
        "fake"
    }

    fn create(&self, path: &Path, tracks: &[TrackKind]) -> Result<Box<dyn ContainerWriter>, CaptureError> {
        if self.fail_create {
            return Err(CaptureError::WriterFailed("cannot create container".into()));
        }
        self.created.lock().push((path.to_path_buf(), tracks.to_vec()));
        Ok(Box::new(FakeWriter::sharing(&self.log)))
    }
}

// --- Capture source ---

#[derive(Default)]
struct SourceState {
    handlers: Option<StreamHandlers>,
    kind: Option<CaptureKind>,
    starts: u32,
    stops: u32,
}

/// Drives a [`FakeSource`] stream from the test thread.
#[derive(Clone, Default)]
pub struct SourceFeed {
    state: Arc<Mutex<SourceState>>,
}

impl SourceFeed {
    /// Deliver a sample the way the platform would. Returns false if the
    /// stream has no handler for the track.
    pub fn push(&self, kind: TrackKind, sample: Sample) -> bool {
        let handler = {
            let state = self.state.lock();
            state.handlers.as_ref().and_then(|h| h.for_track(kind).cloned())
        };
        match handler {
            Some(callback) => {
                callback(sample);
                true
            }
            None => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().handlers.is_some()
    }

    pub fn has_handler(&self, kind: TrackKind) -> bool {
        self.state
            .lock()
            .handlers
            .as_ref()
            .is_some_and(|h| h.for_track(kind).is_some())
    }

    pub fn started_kind(&self) -> Option<CaptureKind> {
        self.state.lock().kind
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().stops
    }
}

pub struct FakeSource {
    clock: Arc<ManualClock>,
    pub permission: bool,
    pub has_content: bool,
    pub fail_start: Option<CaptureError>,
    feed: SourceFeed,
}

impl FakeSource {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            permission: true,
            has_content: true,
            fail_start: None,
            feed: SourceFeed::default(),
        }
    }

    pub fn feed(&self) -> SourceFeed {
        self.feed.clone()
    }
}

struct FakeStream {
    feed: SourceFeed,
}

impl StreamHandle for FakeStream {
    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        let mut state = self.feed.state.lock();
        state.handlers = None;
        state.stops += 1;
        Ok(())
    }
}

impl CaptureSource for FakeSource {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn screen_permission(&self) -> bool {
        self.permission
    }

    fn has_capturable_content(&self, _kind: CaptureKind) -> bool {
        self.has_content
    }

    fn start_stream(&mut self, kind: CaptureKind, handlers: StreamHandlers) -> Result<Box<dyn StreamHandle>, CaptureError> {
        if let Some(e) = self.fail_start.clone() {
            return Err(e);
        }
        {
            let mut state = self.feed.state.lock();
            state.handlers = Some(handlers);
            state.kind = Some(kind);
            state.starts += 1;
        }
        Ok(Box::new(FakeStream {
            feed: self.feed.clone(),
        }))
    }
}

// --- Microphone ---

#[derive(Default)]
struct MicrophoneState {
    tap: Option<MicrophoneCallback>,
    running: bool,
    installed: u32,
    tap_removed: bool,
    stopped: bool,
}

#[derive(Clone, Default)]
pub struct MicrophoneFeed {
    state: Arc<Mutex<MicrophoneState>>,
}

impl MicrophoneFeed {
    /// Deliver one tap buffer. Returns false when no tap is installed or
    /// the engine is not running.
    pub fn push(&self, samples: &[f32], sample_rate: f64, channels: u16, host_time: Duration) -> bool {
        let tap = {
            let state = self.state.lock();
            if !state.running {
                return false;
            }
            state.tap.clone()
        };
        match tap {
            Some(tap) => {
                tap(samples, sample_rate, channels, host_time);
                true
            }
            None => false,
        }
    }

    pub fn installed(&self) -> u32 {
        self.state.lock().installed
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn tap_removed(&self) -> bool {
        self.state.lock().tap_removed
    }

    pub fn stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

pub struct FakeMicrophone {
    pub access: bool,
    pub fail_start: bool,
    feed: MicrophoneFeed,
}

impl FakeMicrophone {
    pub fn new() -> Self {
        Self {
            access: true,
            fail_start: false,
            feed: MicrophoneFeed::default(),
        }
    }

    pub fn feed(&self) -> MicrophoneFeed {
        self.feed.clone()
    }
}

impl AudioInputEngine for FakeMicrophone {
    fn request_access(&self) -> bool {
        self.access
    }

    fn install_tap(&mut self, callback: MicrophoneCallback) -> Result<(), CaptureError> {
        let mut state = self.feed.state.lock();
        state.tap = Some(callback);
        state.installed += 1;
        Ok(())
    }

    fn remove_tap(&mut self) {
        let mut state = self.feed.state.lock();
        state.tap = None;
        state.tap_removed = true;
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::StreamFailed("input device unavailable".into()));
        }
        self.feed.state.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let mut state = self.feed.state.lock();
        state.running = false;
        state.stopped = true;
        Ok(())
    }
}

// --- Delegate ---

#[derive(Default)]
pub struct RecordingDelegate {
    states: Mutex<Vec<&'static str>>,
    errors: Mutex<Vec<CaptureError>>,
    finished: Mutex<Vec<RecordingResult>>,
}

impl RecordingDelegate {
    pub fn states(&self) -> Vec<&'static str> {
        self.states.lock().clone()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().clone()
    }

    pub fn finished(&self) -> Vec<RecordingResult> {
        self.finished.lock().clone()
    }
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &CaptureState) {
        self.states.lock().push(state.name());
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        self.finished.lock().push(result.clone());
    }
}

// --- Whole session ---

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub source: SourceFeed,
    pub microphone: MicrophoneFeed,
    pub writer: WriterLog,
    pub created: Arc<Mutex<Vec<(PathBuf, Vec<TrackKind>)>>>,
    pub delegate: Arc<RecordingDelegate>,
}

impl Harness {
    pub fn at(&self, secs: f64) {
        self.clock.set(Duration::from_secs_f64(secs));
    }
}

pub fn test_config(name: &str) -> CaptureConfiguration {
    CaptureConfiguration {
        output_directory: std::env::temp_dir().join("screen_capture_sessions"),
        file_name: Some(name.to_string()),
        compute_checksum: false,
        ..CaptureConfiguration::default()
    }
}

/// A configured session over fakes, with the clock at zero.
pub fn session_with(
    config: CaptureConfiguration,
    source: impl FnOnce(&mut FakeSource),
    microphone: impl FnOnce(&mut FakeMicrophone),
    factory: FakeWriterFactory,
) -> (CaptureSession<FakeSource, FakeMicrophone>, Harness) {
    let clock = Arc::new(ManualClock::new(Duration::ZERO));
    let mut fake_source = FakeSource::new(Arc::clone(&clock));
    source(&mut fake_source);
    let mut fake_microphone = FakeMicrophone::new();
    microphone(&mut fake_microphone);

    let harness = Harness {
        clock,
        source: fake_source.feed(),
        microphone: fake_microphone.feed(),
        writer: factory.log(),
        created: factory.created(),
        delegate: Arc::new(RecordingDelegate::default()),
    };

    let mut session = CaptureSession::new(fake_source, fake_microphone, Box::new(factory));
    let delegate: Arc<dyn CaptureDelegate> = harness.delegate.clone();
    session.set_delegate(delegate);
    if let Err(e) = session.configure(config) {
        panic!("test configuration rejected: {}", e);
    }
    (session, harness)
}
