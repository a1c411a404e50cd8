//! Scripted pointer input for demos and tests.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::events::PointerEvent;

/// Spacing between generated move samples, in pixels.
const SCRIBBLE_STEP: f32 = 6.0;

/// A recorded sequence of pointer events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct GestureScript {
    pub events: Vec<PointerEvent>,
}

impl GestureScript {
    pub fn from_yaml_str(s: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path.as_ref())?;
        let script = Self::from_yaml_str(&s)?;
        debug!(
            path = %path.as_ref().display(),
            events = script.events.len(),
            "loaded gesture script"
        );
        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Generate `strokes` random straight drags inside a `width`x`height` surface.
///
/// Each drag is a down, evenly spaced moves and an up; the same seed always
/// produces the same script.
pub fn scribble(width: u32, height: u32, strokes: usize, seed: u64) -> GestureScript {
    let mut events = Vec::new();
    if width == 0 || height == 0 {
        return GestureScript { events };
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let (w, h) = (width as f32, height as f32);
    for _ in 0..strokes {
        let (x0, y0) = (rng.random_range(0.0..w), rng.random_range(0.0..h));
        let (x1, y1) = (rng.random_range(0.0..w), rng.random_range(0.0..h));
        let length = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let steps = (length / SCRIBBLE_STEP).ceil().max(1.0) as usize;
        events.push(PointerEvent::Down { x: x0, y: y0 });
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            events.push(PointerEvent::Move {
                x: x0 + (x1 - x0) * t,
                y: y0 + (y1 - y0) * t,
            });
        }
        events.push(PointerEvent::Up { x: x1, y: y1 });
    }
    GestureScript { events }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_events() {
        let script = GestureScript::from_yaml_str(
            "- { kind: down, x: 1, y: 2 }\n- { kind: move, x: 10.5, y: 2 }\n- { kind: up, x: 10.5, y: 2 }\n",
        )
        .unwrap();
        assert_eq!(
            script.events,
            vec![
                PointerEvent::Down { x: 1.0, y: 2.0 },
                PointerEvent::Move { x: 10.5, y: 2.0 },
                PointerEvent::Up { x: 10.5, y: 2.0 },
            ]
        );
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(matches!(
            GestureScript::from_yaml_str("- { kind: hover, x: 1, y: 2 }"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn scribble_is_deterministic_and_in_bounds() {
        let a = scribble(120, 80, 3, 7);
        assert_eq!(a, scribble(120, 80, 3, 7));
        let downs = a
            .events
            .iter()
            .filter(|e| matches!(e, PointerEvent::Down { .. }))
            .count();
        assert_eq!(downs, 3);
        for event in &a.events {
            let (x, y) = event.position();
            assert!((0.0..=120.0).contains(&x) && (0.0..=80.0).contains(&y));
        }
    }

    #[test]
    fn scribble_on_empty_surface_is_empty() {
        assert!(scribble(0, 10, 5, 1).is_empty());
    }
}
