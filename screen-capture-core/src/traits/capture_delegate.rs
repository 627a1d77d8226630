use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::CaptureState;

/// Event delegate for capture session notifications.
///
/// Called from whichever thread drives the session, not the UI thread.
/// Implementations should marshal to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called for session-level failures: permission denied, no display,
    /// save failed.
    fn on_error(&self, error: &CaptureError);

    /// Called once the file is finalized and on disk.
    fn on_recording_finished(&self, result: &RecordingResult);
}
