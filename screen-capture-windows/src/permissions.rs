//! Windows capture permission checks.
//!
//! Microphone access is governed by Settings > Privacy > Microphone. There
//! is no per-app consent dialog for unpackaged desktop apps, so the check
//! is whether the default capture endpoint can be activated. Desktop
//! duplication needs no permission.

use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use screen_capture_core::models::error::CaptureError;

use crate::wasapi_stream::ComGuard;

/// Whether the default microphone can be opened.
///
/// Access denied or a device held exclusively by another app reads as
/// "no permission"; no capture device at all reads the same way.
pub fn check_microphone_permission() -> Result<bool, CaptureError> {
    let _com = ComGuard::init()?;
    unsafe { check_mic_access_inner() }
}

unsafe fn check_mic_access_inner() -> Result<bool, CaptureError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;

    let device = match enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) {
        Ok(d) => d,
        Err(_) => return Ok(false),
    };

    let result: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.code() == E_ACCESSDENIED || e.code() == AUDCLNT_E_DEVICE_IN_USE => Ok(false),
        Err(e) => {
            log::warn!("unexpected error checking microphone permission: {}", e);
            Ok(true)
        }
    }
}

/// Desktop duplication and loopback need no permission on Windows 8 and
/// later.
pub fn check_screen_capture_permission() -> bool {
    true
}
