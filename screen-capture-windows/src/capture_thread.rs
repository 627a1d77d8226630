//! Startup handshake for device threads.
//!
//! COM and DXGI objects must live on the thread that uses them, so each
//! device is opened on its capture thread. The caller still needs to know
//! whether opening worked before it reports the stream as started.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use screen_capture_core::models::error::CaptureError;

/// Spawn `name`, open its device with `open`, then hand it to `run`.
///
/// Returns once `open` succeeded. If it failed, the thread is joined and
/// its error returned.
pub fn spawn_capture_thread<D>(
    name: &str,
    open: impl FnOnce() -> Result<D, CaptureError> + Send + 'static,
    run: impl FnOnce(D) + Send + 'static,
) -> Result<JoinHandle<()>, CaptureError> {
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name(name.into())
        .spawn(move || match open() {
            Ok(device) => {
                ready_tx.send(Ok(())).ok();
                run(device);
            }
            Err(e) => {
                ready_tx.send(Err(e)).ok();
            }
        })
        .map_err(|e| CaptureError::StreamFailed(format!("failed to spawn {}: {}", name, e)))?;

    let started = ready_rx
        .recv()
        .unwrap_or_else(|_| Err(CaptureError::StreamFailed(format!("{} exited during startup", name))));

    match started {
        Ok(()) => Ok(handle),
        Err(e) => {
            if handle.join().is_err() {
                log::warn!("{} panicked during startup", name);
            }
            Err(e)
        }
    }
}
