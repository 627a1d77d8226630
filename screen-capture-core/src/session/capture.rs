use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::media::{CaptureKind, Permission, SessionDiagnostics, TrackKind};
use crate::models::recording_result::{Destination, RecordingMetadata, RecordingResult};
use crate::models::state::CaptureState;
use crate::session::router::{SampleOutput, SampleRouter};
use crate::session::shutdown::ShutdownCoordinator;
use crate::sink::track_sink::TrackSinkSet;
use crate::storage::audio_file::AudioFileWriter;
use crate::storage::checksum::sha256_file;
use crate::storage::metadata::write_metadata;
use crate::timing::clock::Clock;
use crate::timing::offset::Timeline;
use crate::traits::audio_input::AudioInputEngine;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_source::{CaptureSource, StreamHandle, StreamHandlers};
use crate::traits::container_writer::ContainerWriterFactory;

/// Everything that exists only while a recording is in progress.
struct ActiveRecording {
    capture_kind: CaptureKind,
    tracks: Vec<TrackKind>,
    file_path: PathBuf,
    stream: Option<Box<dyn StreamHandle>>,
    router: Arc<SampleRouter>,
    microphone_running: bool,
}

/// One screen recording at a time, owned by the caller.
///
/// Generic over the platform capture source and the microphone engine.
/// Producer callbacks get an `Arc` of the recording's sample router, never
/// the session itself, so the session stays a plain owned value.
///
/// ```text
/// [Capture stream] ─ video ──────┐
///                  ─ system audio ┼→ [SampleRouter] → pause gate → adjust → [TrackSinkSet] → [ContainerWriter]
/// [Microphone tap] ─ microphone ──┘                                      ↘ [AudioFileWriter] (system audio only)
/// ```
///
/// `pause`, `resume` and `stop` from a state that does not allow them are
/// ignored with a warning. All control methods are meant for one control
/// thread; `stop` blocks until the container is flushed.
pub struct CaptureSession<S: CaptureSource, M: AudioInputEngine> {
    source: S,
    microphone: M,
    writer_factory: Box<dyn ContainerWriterFactory>,
    clock: Arc<dyn Clock>,
    config: CaptureConfiguration,
    state: CaptureState,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    timeline: Arc<Timeline>,
    active: Option<ActiveRecording>,
    last_diagnostics: SessionDiagnostics,
}

impl<S: CaptureSource, M: AudioInputEngine> CaptureSession<S, M> {
    pub fn new(source: S, microphone: M, writer_factory: Box<dyn ContainerWriterFactory>) -> Self {
        let clock = source.clock();
        let config = CaptureConfiguration::default();
        Self {
            source,
            microphone,
            writer_factory,
            clock,
            timeline: Arc::new(Timeline::new(config.resume_anchor)),
            config,
            state: CaptureState::Idle,
            delegate: None,
            active: None,
            last_diagnostics: SessionDiagnostics::default(),
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Replace the configuration. Only allowed while idle.
    pub fn configure(&mut self, config: CaptureConfiguration) -> Result<(), CaptureError> {
        if !self.state.is_idle() {
            return Err(CaptureError::ConfigurationFailed(
                "can only configure while idle".into(),
            ));
        }
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        self.timeline.set_anchor(config.resume_anchor);
        self.config = config;
        Ok(())
    }

    pub fn configuration(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Current state, with the recorded duration as of now.
    pub fn state(&self) -> CaptureState {
        match self.state {
            CaptureState::Active { .. } => CaptureState::Active {
                duration_secs: self.recording_duration().as_secs_f64(),
            },
            other => other,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Time recorded so far, pauses excluded.
    pub fn recording_duration(&self) -> Duration {
        self.timeline.recorded_duration(self.clock.now())
    }

    /// Total paused time subtracted from sample timestamps so far.
    pub fn current_offset(&self) -> Duration {
        self.timeline.current_offset()
    }

    /// Tracks of the recording in progress; empty when idle.
    pub fn active_tracks(&self) -> Vec<TrackKind> {
        self.active.as_ref().map(|a| a.tracks.clone()).unwrap_or_default()
    }

    /// Per-track counters of the current recording, or of the last one once
    /// it has stopped.
    pub fn diagnostics(&self) -> SessionDiagnostics {
        match &self.active {
            Some(active) => active.router.diagnostics(),
            None => self.last_diagnostics.clone(),
        }
    }

    /// Begin recording. Transitions: idle → starting → active.
    ///
    /// On failure the session is back to idle with nothing allocated.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_idle() {
            log::warn!("start ignored: session is {}", self.state.name());
            return Err(CaptureError::SessionActive);
        }

        self.set_state(CaptureState::Starting);
        match self.open_recording() {
            Ok(active) => {
                log::info!(
                    "recording {:?} to {} (tracks: {:?})",
                    active.capture_kind,
                    active.file_path.display(),
                    active.tracks
                );
                self.active = Some(active);
                self.set_state(CaptureState::Active { duration_secs: 0.0 });
                Ok(())
            }
            Err(e) => {
                log::error!("failed to start recording: {}", e);
                self.timeline.reset();
                self.set_state(CaptureState::Idle);
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Transitions: active → paused. Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_active() {
            log::warn!("pause ignored: session is {}", self.state.name());
            return false;
        }
        let now = self.clock.now();
        self.timeline.pause(now);
        let duration = self.timeline.recorded_duration(now);
        log::info!("recording paused at {:.3}s", duration.as_secs_f64());
        self.set_state(CaptureState::Paused {
            duration_secs: duration.as_secs_f64(),
        });
        true
    }

    /// Transitions: paused → active. Returns whether the state changed.
    pub fn resume(&mut self) -> bool {
        if !self.state.is_paused() {
            log::warn!("resume ignored: session is {}", self.state.name());
            return false;
        }
        let now = self.clock.now();
        if let Some(paused_for) = self.timeline.resume(now) {
            log::info!(
                "recording resumed after {:.3}s, offset now {:.3}s",
                paused_for.as_secs_f64(),
                self.timeline.current_offset().as_secs_f64()
            );
        }
        self.set_state(CaptureState::Active {
            duration_secs: self.timeline.recorded_duration(now).as_secs_f64(),
        });
        true
    }

    /// Stop and finalize. Transitions: active/paused → stopping → idle.
    ///
    /// Blocks until the container is flushed. Returns `Ok(None)` when there
    /// was no recording to stop. Capture resources are released whether or
    /// not the save succeeds.
    pub fn stop(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        if !self.state.is_recording() {
            log::warn!("stop ignored: session is {}", self.state.name());
            return Ok(None);
        }
        let Some(mut active) = self.active.take() else {
            self.set_state(CaptureState::Idle);
            return Ok(None);
        };

        let now = self.clock.now();
        let duration = self.timeline.recorded_duration(now);
        let paused = self.timeline.paused_duration(now);
        let pause_count = self.timeline.pause_count();
        self.set_state(CaptureState::Stopping);

        if let Some(mut stream) = active.stream.take() {
            if let Err(e) = stream.stop_capture() {
                log::warn!("failed to stop capture stream: {}", e);
            }
        }

        let saved = match active.router.output() {
            SampleOutput::Muxed(sinks) => {
                let microphone = if active.microphone_running {
                    Some(&mut self.microphone as &mut dyn AudioInputEngine)
                } else {
                    None
                };
                ShutdownCoordinator::finalize(sinks, microphone).map(|()| Destination::File(active.file_path.clone()))
            }
            SampleOutput::AudioFile(file) => close_audio_file(file, &self.config.output_directory),
        };

        self.last_diagnostics = active.router.diagnostics();
        let ActiveRecording {
            capture_kind, tracks, ..
        } = active;
        self.timeline.reset();
        self.set_state(CaptureState::Idle);

        let destination = match saved {
            Ok(destination) => destination,
            Err(e) => {
                self.notify_error(&e);
                return Err(e);
            }
        };

        let checksum = match destination.file() {
            Some(path) if self.config.compute_checksum => match sha256_file(path) {
                Ok(digest) => Some(digest),
                Err(e) => {
                    log::warn!("failed to checksum {}: {}", path.display(), e);
                    None
                }
            },
            _ => None,
        };

        let metadata = RecordingMetadata::new(
            capture_kind,
            tracks,
            duration.as_secs_f64(),
            paused.as_secs_f64(),
            pause_count,
            &destination,
            checksum.clone(),
        );
        if self.config.write_metadata_sidecar {
            if let Some(path) = destination.file() {
                if let Err(e) = write_metadata(&metadata, path) {
                    log::warn!("failed to write metadata sidecar: {}", e);
                }
            }
        }

        let result = RecordingResult {
            destination,
            duration_secs: duration.as_secs_f64(),
            paused_secs: paused.as_secs_f64(),
            checksum,
            metadata,
        };
        log::info!(
            "recording saved to {} ({:.3}s recorded, {} pauses)",
            result.destination.path().display(),
            result.duration_secs,
            pause_count
        );
        if let Some(ref delegate) = self.delegate {
            delegate.on_recording_finished(&result);
        }
        Ok(Some(result))
    }

    // --- Internal helpers ---

    fn open_recording(&mut self) -> Result<ActiveRecording, CaptureError> {
        let kind = self.config.capture_kind;
        if !self.source.screen_permission() {
            return Err(CaptureError::PermissionDenied(Permission::ScreenCapture));
        }
        let record_microphone = self.config.records_microphone();
        if record_microphone && !self.microphone.request_access() {
            return Err(CaptureError::PermissionDenied(Permission::Microphone));
        }
        if !self.source.has_capturable_content(kind) {
            return Err(CaptureError::NoDisplayAvailable);
        }

        let stem = self.config.file_stem();
        let (output, file_path, tracks) = if kind.is_audio_only() {
            let directory = &self.config.output_directory;
            let path = unused_output_path(&stem, |stem| directory.join(format!("{}.wav", stem)))?;
            let file = AudioFileWriter::new(path.clone());
            (
                SampleOutput::AudioFile(Arc::new(Mutex::new(Some(file)))),
                path,
                vec![TrackKind::SystemAudio],
            )
        } else {
            let mut tracks = vec![TrackKind::Video];
            if self.config.capture_system_audio {
                tracks.push(TrackKind::SystemAudio);
            }
            if record_microphone {
                tracks.push(TrackKind::Microphone);
            }
            fs::create_dir_all(&self.config.output_directory)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
            let directory = &self.config.output_directory;
            let path = unused_output_path(&stem, |stem| self.writer_factory.output_path(directory, stem))?;
            let writer = self.writer_factory.create(&path, &tracks)?;
            (
                SampleOutput::Muxed(Arc::new(Mutex::new(TrackSinkSet::new(writer, &tracks)))),
                path,
                tracks,
            )
        };

        self.timeline.begin(self.clock.now());
        let router = Arc::new(SampleRouter::new(Arc::clone(&self.timeline), output));

        let handlers = StreamHandlers {
            video: kind.has_video().then(|| router.sample_callback(TrackKind::Video)),
            system_audio: tracks
                .contains(&TrackKind::SystemAudio)
                .then(|| router.sample_callback(TrackKind::SystemAudio)),
        };
        let mut stream = match self.source.start_stream(kind, handlers) {
            Ok(stream) => stream,
            Err(e) => {
                discard_output(router.output(), &file_path);
                return Err(e);
            }
        };

        if record_microphone {
            if let Err(e) = self.start_microphone(&router) {
                if let Err(stop_err) = stream.stop_capture() {
                    log::warn!("failed to stop capture stream: {}", stop_err);
                }
                discard_output(router.output(), &file_path);
                return Err(e);
            }
        }

        Ok(ActiveRecording {
            capture_kind: kind,
            tracks,
            file_path,
            stream: Some(stream),
            router,
            microphone_running: record_microphone,
        })
    }

    fn start_microphone(&mut self, router: &Arc<SampleRouter>) -> Result<(), CaptureError> {
        self.microphone.install_tap(router.microphone_callback())?;
        if let Err(e) = self.microphone.start() {
            self.microphone.remove_tap();
            return Err(e);
        }
        Ok(())
    }

    fn set_state(&mut self, new_state: CaptureState) {
        log::debug!("session state {} -> {}", self.state.name(), new_state.name());
        self.state = new_state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    fn notify_error(&self, error: &CaptureError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}

impl<S: CaptureSource, M: AudioInputEngine> Drop for CaptureSession<S, M> {
    fn drop(&mut self) {
        if self.state.is_recording() {
            log::warn!("capture session dropped while recording, stopping");
            if let Err(e) = self.stop() {
                log::error!("failed to save recording on drop: {}", e);
            }
        }
    }
}

fn close_audio_file(file: &Mutex<Option<AudioFileWriter>>, folder: &Path) -> Result<Destination, CaptureError> {
    let Some(mut writer) = file.lock().take() else {
        return Ok(Destination::Folder(folder.to_path_buf()));
    };
    match writer.close() {
        Ok(true) => Ok(Destination::File(writer.file_path().to_path_buf())),
        Ok(false) => {
            log::info!("no system audio received, nothing written");
            Ok(Destination::Folder(folder.to_path_buf()))
        }
        Err(e) => Err(CaptureError::RecordingSaveFailed(e.to_string())),
    }
}

/// Highest ` (n)` suffix tried before giving up on a stem.
const MAX_NAME_SUFFIX: u32 = 9999;

/// First path from `path_for` that does not exist yet: `stem`, then
/// `stem (2)`, `stem (3)` and so on.
fn unused_output_path(stem: &str, path_for: impl Fn(&str) -> PathBuf) -> Result<PathBuf, CaptureError> {
    let path = path_for(stem);
    if !path.exists() {
        return Ok(path);
    }
    for n in 2..=MAX_NAME_SUFFIX {
        let candidate = path_for(&format!("{} ({})", stem, n));
        if !candidate.exists() {
            log::info!("{} exists, recording to {}", path.display(), candidate.display());
            return Ok(candidate);
        }
    }
    Err(CaptureError::StorageError(format!("no free file name for {}", path.display())))
}

/// Tear down an output that never became a recording.
fn discard_output(output: &SampleOutput, path: &Path) {
    match output {
        SampleOutput::Muxed(sinks) => {
            if sinks.lock().finish_all().is_some() && path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("failed to remove {}: {}", path.display(), e);
                }
            }
        }
        SampleOutput::AudioFile(file) => {
            if let Some(mut writer) = file.lock().take() {
                if let Ok(true) = writer.close() {
                    fs::remove_file(path).ok();
                }
            }
        }
    }
}
