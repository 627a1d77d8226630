//! # screen-capture-core
//!
//! Platform-agnostic screen recording session core.
//!
//! Owns the recording lifecycle (start, pause, resume, stop) and keeps every
//! track's timestamps continuous across pauses. Platform backends implement
//! `CaptureSource` (screen stream and host clock) and `AudioInputEngine`
//! (microphone) and plug into the generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! screen-capture-core (this crate)
//! ├── traits/   ← CaptureSource, AudioInputEngine, ContainerWriter, CaptureDelegate
//! ├── models/   ← CaptureError, CaptureState, CaptureConfiguration, Sample, etc.
//! ├── timing/   ← Clock, Timeline (pause offset), timestamp adjustment
//! ├── sink/     ← TrackSinkSet (per-track ordering, writer session start)
//! ├── session/  ← CaptureSession, SampleRouter, ShutdownCoordinator
//! └── storage/  ← sample container, WAV file, checksum, metadata sidecar
//! ```

pub mod models;
pub mod session;
pub mod sink;
pub mod storage;
pub mod timing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureConfiguration, ResumeAnchor};
pub use models::error::CaptureError;
pub use models::media::{CaptureKind, FormatDescription, PcmEncoding, Permission, SessionDiagnostics, TrackKind, TrackStats};
pub use models::recording_result::{Destination, RecordingMetadata, RecordingResult};
pub use models::sample::{Sample, SampleTiming};
pub use models::state::CaptureState;
pub use session::capture::CaptureSession;
pub use session::shutdown::{finalize_signal, FinalizeCompletion, FinalizeWaiter, ShutdownCoordinator};
pub use sink::track_sink::{AppendOutcome, TrackSinkSet};
pub use storage::sample_container::{SampleContainerFactory, SampleContainerWriter};
pub use timing::adjust::adjust_time;
pub use timing::clock::{Clock, ManualClock, MonotonicClock};
pub use timing::offset::{Timeline, TimingSnapshot};
pub use traits::audio_input::{AudioInputEngine, MicrophoneCallback};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_source::{CaptureSource, SampleCallback, StreamHandle, StreamHandlers};
pub use traits::container_writer::{ContainerWriter, ContainerWriterFactory};
