/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → active ↔ paused
///          ↓          ↓        ↓
///        idle      stopping ← ┘
///                     ↓
///                   idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    Idle,
    Starting,
    Active { duration_secs: f64 },
    Paused { duration_secs: f64 },
    Stopping,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Active or paused: a stream is running and `stop()` will finalize it.
    pub fn is_recording(&self) -> bool {
        self.is_active() || self.is_paused()
    }

    /// Returns the recorded duration if in a state that tracks it.
    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Active { duration_secs } | Self::Paused { duration_secs } => Some(*duration_secs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active { .. } => "active",
            Self::Paused { .. } => "paused",
            Self::Stopping => "stopping",
        }
    }
}
