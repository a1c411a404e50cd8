use serde::Deserialize;

/// Pointer input in surface-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
}

impl PointerEvent {
    pub fn position(&self) -> (f32, f32) {
        match *self {
            Self::Down { x, y } | Self::Move { x, y } | Self::Up { x, y } => (x, y),
        }
    }
}

/// Notifications delivered to the host's reveal listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevealEvent {
    /// Newly measured share of erased pixels, in percent (0-100).
    PercentChanged(f32),
    /// The whole measured region is transparent. Delivered at most once.
    FullyRevealed,
}

/// Result of one background transparency sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleCompleted {
    /// Monotonic request number, assigned when the sample was admitted.
    pub generation: u64,
    /// Transparent fraction in `[0, 1]`.
    pub fraction: f32,
}
