//! Host clock backed by QueryPerformanceCounter.

use std::time::Duration;

use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};

use screen_capture_core::models::error::CaptureError;
use screen_capture_core::timing::clock::Clock;

/// QPC time since boot. Shares its timebase with WASAPI buffer positions,
/// so audio packets and frames stamped on it line up.
#[derive(Debug, Clone, Copy)]
pub struct QpcClock {
    frequency: u64,
}

impl QpcClock {
    pub fn new() -> Result<Self, CaptureError> {
        let mut frequency: i64 = 0;
        unsafe { QueryPerformanceFrequency(&mut frequency) }
            .map_err(|e| CaptureError::Unknown(format!("QueryPerformanceFrequency failed: {}", e)))?;
        if frequency <= 0 {
            return Err(CaptureError::Unknown("performance counter unavailable".into()));
        }
        Ok(Self {
            frequency: frequency as u64,
        })
    }

    /// Convert a raw counter value to time since boot.
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let secs = ticks / self.frequency;
        let rem = ticks % self.frequency;
        Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / self.frequency)
    }
}

impl Clock for QpcClock {
    fn now(&self) -> Duration {
        let mut ticks: i64 = 0;
        if let Err(e) = unsafe { QueryPerformanceCounter(&mut ticks) } {
            // Cannot fail on XP and later.
            log::error!("QueryPerformanceCounter failed: {}", e);
        }
        self.ticks_to_duration(ticks.max(0) as u64)
    }
}
