//! Timestamp continuity across pause/resume.

pub mod adjust;
pub mod clock;
pub mod offset;
