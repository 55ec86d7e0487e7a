//! Observations of the target as seen by the camera.

use serde::{Deserialize, Serialize};

/// Position and apparent size of the target in the camera image.
///
/// `(0, 0, 0)` is reserved to mean that no target was detected, anything consuming observations
/// should treat it as the end of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Units: pixels
    pub x: f64,

    /// Units: pixels
    pub y: f64,

    /// Units: pixels
    pub radius: f64,
}

impl Observation {
    /// No target was detected.
    pub const NONE: Observation = Observation {
        x: 0.0,
        y: 0.0,
        radius: 0.0,
    };

    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    /// Whether this observation actually contains a target.
    pub fn is_detected(&self) -> bool {
        *self != Self::NONE
    }
}

impl From<(f64, f64, f64)> for Observation {
    fn from((x, y, radius): (f64, f64, f64)) -> Self {
        Self::new(x, y, radius)
    }
}
