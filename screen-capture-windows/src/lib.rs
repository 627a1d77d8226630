//! # screen-capture-windows
//!
//! Windows backend for screen-capture-kit.
//!
//! Provides:
//! - `WindowsCaptureSource`: `CaptureSource` over DXGI desktop duplication
//!   (video) and WASAPI loopback (system audio)
//! - `WasapiMicrophone`: `AudioInputEngine` over a WASAPI capture endpoint
//! - `QpcClock`: QueryPerformanceCounter host clock, the timebase shared by
//!   WASAPI packet positions and captured frames
//! - `permissions`: microphone privacy check
//!
//! ## Platform Requirements
//! - Windows 8+ for desktop duplication
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use screen_capture_core::{CaptureConfiguration, CaptureSession, SampleContainerFactory};
//! use screen_capture_windows::{WasapiMicrophone, WindowsCaptureSource};
//!
//! let source = WindowsCaptureSource::primary_display()?;
//! let mut session = CaptureSession::new(source, WasapiMicrophone::default_device(), Box::new(SampleContainerFactory));
//! session.configure(CaptureConfiguration {
//!     record_microphone: true,
//!     ..Default::default()
//! })?;
//! session.start()?;
//! ```

pub mod capture_thread;

#[cfg(target_os = "windows")]
pub mod clock;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod screen_source;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;
#[cfg(target_os = "windows")]
pub mod wasapi_stream;

#[cfg(target_os = "windows")]
pub use clock::QpcClock;
#[cfg(target_os = "windows")]
pub use screen_source::WindowsCaptureSource;
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicrophone;
