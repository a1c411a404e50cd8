//! Pointer-drag smoothing.
//!
//! A stroke is committed piecewise: every accepted move yields one short path
//! segment that the surface cuts into the mask immediately, so the offscreen
//! mask always matches what has been drawn and can be sampled mid-drag.

use lyon::math::{Point, point};
use lyon::path::Path;
use tracing::trace;

/// Base erase width in pixels, scaled by the stroke width multiplier.
pub const BASE_STROKE_WIDTH: f32 = 10.0;

/// Pointer movements smaller than this on both axes are treated as jitter.
pub const TOUCH_TOLERANCE: f32 = 4.0;

/// Stroke width in pixels for a multiplier.
pub fn stroke_width_for(multiplier: u32) -> f32 {
    multiplier as f32 * BASE_STROKE_WIDTH
}

/// One committed piece of a stroke, ready to be cut into the mask.
#[derive(Debug, Clone)]
pub struct StrokePath {
    path: Path,
}

impl StrokePath {
    /// Quadratic from `from` (control `ctrl`) to `mid`, then a straight line to `to`.
    fn smoothed(from: Point, ctrl: Point, mid: Point, to: Point) -> Self {
        let mut builder = Path::builder();
        builder.begin(from);
        builder.quadratic_bezier_to(ctrl, mid);
        builder.line_to(to);
        builder.end(false);
        Self {
            path: builder.build(),
        }
    }

    /// Zero-length segment at `at`; erases a round dot of the stroke width.
    fn dot(at: Point) -> Self {
        let mut builder = Path::builder();
        builder.begin(at);
        builder.line_to(at);
        builder.end(false);
        Self {
            path: builder.build(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TrackerState {
    Idle,
    Dragging { anchor: Point },
}

/// Converts down/move/up samples into committed stroke segments.
#[derive(Debug, Clone)]
pub struct StrokeTracker {
    state: TrackerState,
    tolerance: f32,
}

impl Default for StrokeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StrokeTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::Idle,
            tolerance: TOUCH_TOLERANCE,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, TrackerState::Dragging { .. })
    }

    /// Last committed point of the current stroke.
    pub fn anchor(&self) -> Option<(f32, f32)> {
        match self.state {
            TrackerState::Idle => None,
            TrackerState::Dragging { anchor } => Some((anchor.x, anchor.y)),
        }
    }

    /// Start a new stroke at `(x, y)`, discarding any stroke in progress.
    pub fn begin(&mut self, x: f32, y: f32) {
        trace!(x, y, "stroke begin");
        self.state = TrackerState::Dragging { anchor: point(x, y) };
    }

    /// Extend the stroke towards `(x, y)`.
    ///
    /// Returns the committed segment, or `None` when idle or when the move stays
    /// within the tolerance of the anchor on both axes.
    pub fn extend(&mut self, x: f32, y: f32) -> Option<StrokePath> {
        let TrackerState::Dragging { anchor } = self.state else {
            return None;
        };
        let dx = (x - anchor.x).abs();
        let dy = (y - anchor.y).abs();
        if dx < self.tolerance && dy < self.tolerance {
            trace!(x, y, dx, dy, "move within tolerance, dropped");
            return None;
        }
        let to = point(x, y);
        let mid = point((x + anchor.x) / 2.0, (y + anchor.y) / 2.0);
        self.state = TrackerState::Dragging { anchor: to };
        trace!(x, y, "stroke segment committed");
        Some(StrokePath::smoothed(anchor, anchor, mid, to))
    }

    /// Finish the stroke with a final commit at the anchor and return to idle.
    ///
    /// The release position itself is not added to the path; the last accepted
    /// move is where the stroke ends.
    pub fn end(&mut self, x: f32, y: f32) -> Option<StrokePath> {
        let TrackerState::Dragging { anchor } = self.state else {
            return None;
        };
        trace!(x, y, anchor_x = anchor.x, anchor_y = anchor.y, "stroke end");
        self.state = TrackerState::Idle;
        Some(StrokePath::dot(anchor))
    }
}
