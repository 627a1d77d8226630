use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::sample::{Sample, SampleTiming};

/// Shift every timing entry of `sample` back by `offset`.
///
/// Returns a copy sharing the original payload; `sample` is untouched.
/// Timestamps saturate at zero. Fails with `NoFormatDescription` when the
/// producer sent a sample without format metadata.
pub fn adjust_time(sample: &Sample, offset: Duration) -> Result<Sample, CaptureError> {
    if sample.format().is_none() {
        return Err(CaptureError::NoFormatDescription);
    }

    let timing = sample
        .timing()
        .iter()
        .map(|t| SampleTiming {
            duration: t.duration,
            presentation: t.presentation.saturating_sub(offset),
            decode: t.decode.map(|d| d.saturating_sub(offset)),
        })
        .collect();

    Ok(sample.with_timing(timing))
}
