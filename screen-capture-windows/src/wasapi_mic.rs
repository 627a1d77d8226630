//! WASAPI microphone engine.
//!
//! Captures from a WASAPI capture endpoint in shared mode and hands Float32
//! buffers to the installed tap, stamped with the buffer's QPC position.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use screen_capture_core::models::error::CaptureError;
use screen_capture_core::traits::audio_input::{AudioInputEngine, MicrophoneCallback};

use crate::permissions;
use crate::wasapi_stream::{spawn_stream, Endpoint};

type SharedTap = Arc<Mutex<Option<MicrophoneCallback>>>;

/// Microphone input over WASAPI.
///
/// The tap can be swapped or removed while the engine runs; buffers that
/// arrive with no tap installed are released and dropped.
pub struct WasapiMicrophone {
    device_id: Option<String>,
    tap: SharedTap,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WasapiMicrophone {
    /// Engine for the system default microphone.
    pub fn default_device() -> Self {
        Self::with_device_id(None)
    }

    /// Engine for a specific capture endpoint ID.
    pub fn with_device_id(device_id: Option<String>) -> Self {
        Self {
            device_id,
            tap: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        }
    }
}

impl AudioInputEngine for WasapiMicrophone {
    fn request_access(&self) -> bool {
        match permissions::check_microphone_permission() {
            Ok(granted) => granted,
            Err(e) => {
                log::warn!("microphone permission check failed: {}", e);
                false
            }
        }
    }

    fn install_tap(&mut self, callback: MicrophoneCallback) -> Result<(), CaptureError> {
        *self.tap.lock() = Some(callback);
        Ok(())
    }

    fn remove_tap(&mut self) {
        self.tap.lock().take();
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed(
                "microphone engine already running".into(),
            ));
        }

        let tap = Arc::clone(&self.tap);
        let started = spawn_stream(
            "wasapi-mic-capture",
            Endpoint::Capture(self.device_id.clone()),
            Arc::clone(&self.running),
            move |samples, sample_rate, channels, host_time| {
                let callback = tap.lock().clone();
                if let Some(callback) = callback {
                    callback(samples, sample_rate, channels, host_time);
                }
            },
        );

        match started {
            Ok(handle) => {
                *self.capture_handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            if handle.join().is_err() {
                return Err(CaptureError::StreamFailed("microphone thread panicked".into()));
            }
        }
        Ok(())
    }
}

impl Drop for WasapiMicrophone {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("{}", e);
        }
    }
}
