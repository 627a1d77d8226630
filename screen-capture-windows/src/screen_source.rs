//! Display and system-audio capture source.
//!
//! Video comes from DXGI desktop duplication through `windows-capture`,
//! system audio from a WASAPI loopback stream on the default render device.
//! Both are stamped on the QPC clock the source hands to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use windows_capture::dxgi_duplication_api::{DxgiDuplicationApi, Error as DuplicationError};
use windows_capture::monitor::Monitor;

use screen_capture_core::models::error::CaptureError;
use screen_capture_core::models::media::{CaptureKind, FormatDescription};
use screen_capture_core::models::sample::{Sample, SampleTiming};
use screen_capture_core::timing::clock::Clock;
use screen_capture_core::traits::capture_source::{CaptureSource, SampleCallback, StreamHandle, StreamHandlers};

use crate::capture_thread::spawn_capture_thread;
use crate::clock::QpcClock;
use crate::permissions;
use crate::wasapi_stream::{self, Endpoint};

const DEFAULT_FRAME_RATE: u32 = 30;
const ACQUIRE_TIMEOUT_MS: u32 = 100;

/// Captures one display, plus system audio through loopback.
///
/// Supports [`CaptureKind::Display`] and [`CaptureKind::SystemAudio`].
/// Frames are delivered as tightly packed BGRA8.
pub struct WindowsCaptureSource {
    clock: Arc<QpcClock>,
    monitor_index: Option<usize>,
    frame_interval: Duration,
}

impl WindowsCaptureSource {
    /// Source for the primary display.
    pub fn primary_display() -> Result<Self, CaptureError> {
        Self::new(None)
    }

    /// Source for the display at `index` in monitor enumeration order.
    pub fn display(index: usize) -> Result<Self, CaptureError> {
        Self::new(Some(index))
    }

    fn new(monitor_index: Option<usize>) -> Result<Self, CaptureError> {
        Ok(Self {
            clock: Arc::new(QpcClock::new()?),
            monitor_index,
            frame_interval: Duration::from_secs(1) / DEFAULT_FRAME_RATE,
        })
    }

    /// Cap the delivered frame rate. Frames arriving sooner are skipped.
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = Duration::from_secs(1) / fps.max(1);
        self
    }
}

impl CaptureSource for WindowsCaptureSource {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn screen_permission(&self) -> bool {
        permissions::check_screen_capture_permission()
    }

    fn has_capturable_content(&self, kind: CaptureKind) -> bool {
        match kind {
            CaptureKind::Display => match Monitor::enumerate() {
                Ok(monitors) => match self.monitor_index {
                    Some(index) => index < monitors.len(),
                    None => !monitors.is_empty(),
                },
                Err(e) => {
                    log::warn!("failed to enumerate monitors: {}", e);
                    false
                }
            },
            CaptureKind::SystemAudio => wasapi_stream::has_render_endpoint(),
            CaptureKind::Window | CaptureKind::Area | CaptureKind::Application => {
                log::warn!("{:?} capture is not supported by the display source", kind);
                false
            }
        }
    }

    fn start_stream(&mut self, kind: CaptureKind, handlers: StreamHandlers) -> Result<Box<dyn StreamHandle>, CaptureError> {
        if !matches!(kind, CaptureKind::Display | CaptureKind::SystemAudio) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "{:?} capture is not supported by the display source",
                kind
            )));
        }

        // Dropping the partially built stream stops whatever already runs.
        let mut stream = WindowsCaptureStream {
            running: Arc::new(AtomicBool::new(true)),
            threads: Vec::new(),
        };

        if let Some(video) = handlers.video.filter(|_| kind.has_video()) {
            let frames = DisplayFrames {
                monitor_index: self.monitor_index,
                frame_interval: self.frame_interval,
                clock: Arc::clone(&self.clock),
                callback: video,
                running: Arc::clone(&stream.running),
            };
            let monitor_index = self.monitor_index;
            stream.threads.push(spawn_capture_thread(
                "dxgi-display-capture",
                move || open_duplication(monitor_index),
                move |duplication| {
                    if let Err(e) = frames.run(duplication) {
                        log::error!("display capture error: {}", e);
                    }
                },
            )?);
        }

        if let Some(system_audio) = handlers.system_audio {
            stream.threads.push(wasapi_stream::spawn_stream(
                "wasapi-loopback-capture",
                Endpoint::Loopback,
                Arc::clone(&stream.running),
                move |samples, sample_rate, channels, host_time| {
                    system_audio(Sample::from_pcm_f32(samples, sample_rate, channels, host_time));
                },
            )?);
        }

        log::info!("{:?} stream started ({} threads)", kind, stream.threads.len());
        Ok(Box::new(stream))
    }
}

/// Running capture threads of one stream.
struct WindowsCaptureStream {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl StreamHandle for WindowsCaptureStream {
    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        let mut panicked = 0;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(CaptureError::StreamFailed(format!("{} capture threads panicked", panicked)));
        }
        Ok(())
    }
}

impl Drop for WindowsCaptureStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop_capture() {
            log::warn!("{}", e);
        }
    }
}

fn open_duplication(monitor_index: Option<usize>) -> Result<DxgiDuplicationApi, CaptureError> {
    let monitor = match monitor_index {
        Some(index) => Monitor::enumerate()
            .map_err(|e| CaptureError::StreamFailed(format!("failed to enumerate monitors: {}", e)))?
            .get(index)
            .cloned()
            .ok_or(CaptureError::NoDisplayAvailable)?,
        None => Monitor::primary().map_err(|_| CaptureError::NoDisplayAvailable)?,
    };
    DxgiDuplicationApi::new(monitor)
        .map_err(|e| CaptureError::StreamFailed(format!("failed to start desktop duplication: {:?}", e)))
}

/// Frame loop state moved onto the display capture thread.
struct DisplayFrames {
    monitor_index: Option<usize>,
    frame_interval: Duration,
    clock: Arc<QpcClock>,
    callback: SampleCallback,
    running: Arc<AtomicBool>,
}

impl DisplayFrames {
    fn run(&self, mut duplication: DxgiDuplicationApi) -> Result<(), CaptureError> {
        let mut size = (duplication.width(), duplication.height());
        let mut raw = Vec::new();
        let mut next_frame_at = Duration::ZERO;

        while self.running.load(Ordering::SeqCst) {
            let access_lost = match duplication.acquire_next_frame(ACQUIRE_TIMEOUT_MS) {
                Ok(mut frame) => {
                    let now = self.clock.now();
                    if now >= next_frame_at {
                        next_frame_at = now + self.frame_interval;
                        match frame.buffer() {
                            Ok(buffer) => {
                                let pixels = buffer.as_nopadding_buffer(&mut raw);
                                (self.callback)(self.frame_sample(size, now, pixels.to_vec()));
                            }
                            Err(e) => log::warn!("failed to read frame buffer: {:?}", e),
                        }
                    }
                    false
                }
                Err(DuplicationError::Timeout) => false,
                Err(DuplicationError::AccessLost) => true,
                Err(e) => {
                    return Err(CaptureError::StreamFailed(format!("failed to acquire frame: {:?}", e)));
                }
            };

            // Desktop switches and mode changes invalidate the duplication.
            if access_lost {
                log::warn!("desktop duplication access lost, reopening");
                duplication = open_duplication(self.monitor_index)?;
                size = (duplication.width(), duplication.height());
            }
        }

        Ok(())
    }

    fn frame_sample(&self, (width, height): (u32, u32), at: Duration, pixels: Vec<u8>) -> Sample {
        Sample::new(
            Some(FormatDescription::Video { width, height }),
            vec![SampleTiming {
                duration: Some(self.frame_interval),
                presentation: at,
                decode: Some(at),
            }],
            pixels,
        )
    }
}
