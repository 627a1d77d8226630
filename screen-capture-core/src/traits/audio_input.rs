use std::sync::Arc;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Callback invoked when a microphone buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of channels.
/// - `host_time`: Capture time of the first frame, on the capture source's clock.
pub type MicrophoneCallback = Arc<dyn Fn(&[f32], f64, u16, Duration) + Send + Sync + 'static>;

/// Microphone input engine, independent of the screen capture stream.
///
/// Lifecycle: `request_access` → `install_tap` → `start` … `remove_tap` → `stop`.
pub trait AudioInputEngine: Send + Sync {
    /// Ask for (or check) microphone access.
    fn request_access(&self) -> bool;

    /// Attach the callback that receives every input buffer.
    fn install_tap(&mut self, callback: MicrophoneCallback) -> Result<(), CaptureError>;

    /// Detach the tap. No callbacks fire after this returns.
    fn remove_tap(&mut self);

    fn start(&mut self) -> Result<(), CaptureError>;

    fn stop(&mut self) -> Result<(), CaptureError>;
}
