use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::media::TrackKind;
use crate::models::sample::Sample;
use crate::session::shutdown::FinalizeCompletion;

/// Muxing container writer with one input per track.
///
/// Calls arrive from producer threads, serialized by the session's track
/// sink lock.
pub trait ContainerWriter: Send {
    /// Begin the output timeline at `at`. Called once, before the first append.
    fn start_session(&mut self, at: Duration) -> Result<(), CaptureError>;

    /// Whether the input for `kind` can take another sample right now.
    fn is_ready_for_more_data(&self, kind: TrackKind) -> bool;

    fn append(&mut self, kind: TrackKind, sample: &Sample) -> Result<(), CaptureError>;

    /// No more samples will arrive for `kind`.
    fn mark_finished(&mut self, kind: TrackKind);

    /// Flush and close the container. May complete on another thread; the
    /// writer must eventually call `completion.complete(..)`.
    fn finish_writing(&mut self, completion: FinalizeCompletion);
}

/// Creates a container writer for a new recording.
pub trait ContainerWriterFactory: Send + Sync {
    /// Extension of the produced file, without the dot.
    fn file_extension(&self) -> &str;

    fn create(&self, path: &Path, tracks: &[TrackKind]) -> Result<Box<dyn ContainerWriter>, CaptureError>;

    /// Path of the file to create for `stem` inside `directory`.
    fn output_path(&self, directory: &Path, stem: &str) -> PathBuf {
        directory.join(format!("{}.{}", stem, self.file_extension()))
    }
}
