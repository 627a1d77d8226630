//! Shared-mode WASAPI capture stream.
//!
//! One polling loop serves both the microphone (a capture endpoint) and
//! system audio (loopback on the default render endpoint). Packets are
//! handed over as interleaved Float32 together with the QPC time WASAPI
//! recorded for their first frame, so they line up with
//! [`QpcClock`](crate::clock::QpcClock).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use screen_capture_core::models::error::CaptureError;
use screen_capture_core::models::media::Permission;

use crate::capture_thread::spawn_capture_thread;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 100ms, in 100ns units.
const BUFFER_DURATION: i64 = 1_000_000;

/// Where a stream reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A capture device by endpoint ID; `None` is the default microphone.
    Capture(Option<String>),
    /// Whatever is playing on the default render device.
    Loopback,
}

impl Endpoint {
    fn label(&self) -> &'static str {
        match self {
            Self::Capture(_) => "microphone",
            Self::Loopback => "system audio",
        }
    }
}

/// Open `endpoint` on a new thread and deliver packets to `on_packet`
/// until `running` clears.
///
/// Returns after the stream has started, or with the reason it could not.
pub fn spawn_stream(
    thread_name: &str,
    endpoint: Endpoint,
    running: Arc<AtomicBool>,
    on_packet: impl FnMut(&[f32], f64, u16, Duration) + Send + 'static,
) -> Result<JoinHandle<()>, CaptureError> {
    spawn_capture_thread(
        thread_name,
        move || WasapiStream::open(&endpoint),
        move |stream| {
            if let Err(e) = stream.pump(&running, on_packet) {
                log::error!("{} capture error: {}", stream.label, e);
            }
        },
    )
}

/// Whether a default render device exists to loop back from.
pub fn has_render_endpoint() -> bool {
    let Ok(_com) = ComGuard::init() else {
        return false;
    };
    unsafe {
        let enumerator: windows::core::Result<IMMDeviceEnumerator> =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL);
        enumerator
            .and_then(|e| e.GetDefaultAudioEndpoint(eRender, eConsole))
            .is_ok()
    }
}

/// A started stream. Lives on the thread that opened it.
struct WasapiStream {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    sample_rate: f64,
    channels: u16,
    label: &'static str,
    // Dropped last: COM stays initialized until the clients are released.
    _com: ComGuard,
}

impl WasapiStream {
    /// COM (MTA) → endpoint → IAudioClient in shared mode → IAudioCaptureClient
    /// → MMCSS "Pro Audio" → Start.
    fn open(endpoint: &Endpoint) -> Result<Self, CaptureError> {
        let com = ComGuard::init()?;
        let label = endpoint.label();

        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::StreamFailed(format!("failed to create enumerator: {}", e)))?;

            let (device, stream_flags) = match endpoint {
                Endpoint::Capture(Some(id)) => {
                    let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                    (enumerator.GetDevice(PCWSTR(wide_id.as_ptr())), AUDCLNT_STREAMFLAGS_NOPERSIST)
                }
                Endpoint::Capture(None) => (
                    enumerator.GetDefaultAudioEndpoint(eCapture, eConsole),
                    AUDCLNT_STREAMFLAGS_NOPERSIST,
                ),
                Endpoint::Loopback => (
                    enumerator.GetDefaultAudioEndpoint(eRender, eConsole),
                    AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                ),
            };
            let device = device.map_err(|e| match endpoint {
                Endpoint::Capture(_) => CaptureError::PermissionDenied(Permission::Microphone),
                Endpoint::Loopback => CaptureError::StreamFailed(format!("no audio output device: {}", e)),
            })?;

            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

            let mix_format_ptr = audio_client
                .GetMixFormat()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
            let sample_rate = (*mix_format_ptr).nSamplesPerSec as f64;
            let channels = (*mix_format_ptr).nChannels;

            let initialized = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                stream_flags,
                BUFFER_DURATION,
                0,
                mix_format_ptr,
                None,
            );
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            initialized
                .map_err(|e| CaptureError::ConfigurationFailed(format!("IAudioClient::Initialize failed: {}", e)))?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

            let mut task_index: u32 = 0;
            let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
            if AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index).is_err() {
                log::debug!("{} thread runs without MMCSS priority", label);
            }

            audio_client
                .Start()
                .map_err(|e| CaptureError::StreamFailed(format!("IAudioClient::Start failed: {}", e)))?;

            log::info!("{} capture started ({} Hz, {} ch)", label, sample_rate, channels);

            Ok(Self {
                audio_client,
                capture_client,
                sample_rate,
                channels,
                label,
                _com: com,
            })
        }
    }

    /// Poll for packets every 10ms until `running` clears. Silent packets
    /// are delivered as zeros.
    fn pump(
        &self,
        running: &AtomicBool,
        mut on_packet: impl FnMut(&[f32], f64, u16, Duration),
    ) -> Result<(), CaptureError> {
        let mut silence: Vec<f32> = Vec::new();

        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            unsafe {
                let mut packet_length = self
                    .capture_client
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::StreamFailed(format!("GetNextPacketSize failed: {}", e)))?;

                while packet_length > 0 {
                    let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                    let mut num_frames: u32 = 0;
                    let mut flags: u32 = 0;
                    let mut qpc_position: u64 = 0;

                    self.capture_client
                        .GetBuffer(
                            &mut buffer_ptr,
                            &mut num_frames,
                            &mut flags,
                            None,
                            Some(&mut qpc_position),
                        )
                        .map_err(|e| CaptureError::StreamFailed(format!("GetBuffer failed: {}", e)))?;

                    if num_frames > 0 && !buffer_ptr.is_null() {
                        let total_samples = num_frames as usize * self.channels as usize;
                        // QPC position comes back in 100ns units.
                        let host_time = Duration::from_nanos(qpc_position.saturating_mul(100));

                        if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                            silence.clear();
                            silence.resize(total_samples, 0.0);
                            on_packet(&silence, self.sample_rate, self.channels, host_time);
                        } else {
                            // Shared mode delivers Float32.
                            let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                            on_packet(samples, self.sample_rate, self.channels, host_time);
                        }
                    }

                    self.capture_client
                        .ReleaseBuffer(num_frames)
                        .map_err(|e| CaptureError::StreamFailed(format!("ReleaseBuffer failed: {}", e)))?;

                    packet_length = self
                        .capture_client
                        .GetNextPacketSize()
                        .map_err(|e| CaptureError::StreamFailed(format!("GetNextPacketSize failed: {}", e)))?;
                }
            }
        }

        Ok(())
    }
}

impl Drop for WasapiStream {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.audio_client.Stop() } {
            log::warn!("IAudioClient::Stop failed: {}", e);
        }
        log::info!("{} capture stopped", self.label);
    }
}

/// Initializes COM (MTA) for the current thread; uninitializes on drop.
pub struct ComGuard;

impl ComGuard {
    pub fn init() -> Result<Self, CaptureError> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
            .ok()
            .map_err(|e| CaptureError::StreamFailed(format!("CoInitializeEx failed: {}", e)))?;
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
