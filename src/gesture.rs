// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Maps hand pinch distances onto playback controls.
//!
//! The left hand's thumb-to-index distance drives the volume and the right hand's
//! drives the speed bias. Raw distances are normalized against a per-hand range
//! learned during calibration. Landmark detection happens elsewhere; this module
//! only sees distances.

use std::fmt;

use tracing::{debug, info};

/// How much a collapsed range is widened so normalization never divides by zero.
const MIN_RANGE_WIDTH: f32 = 0.1;

/// Which hand an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hand::Left => write!(f, "left"),
            Hand::Right => write!(f, "right"),
        }
    }
}

/// The pinch distance range of one hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandRange {
    min: f32,
    max: f32,
}

impl HandRange {
    /// Creates a range. A `max` at or below `min` is widened to `min + 0.1`.
    pub fn new(min: f32, max: f32) -> HandRange {
        let max = if max <= min { min + MIN_RANGE_WIDTH } else { max };
        HandRange { min, max }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Normalizes a distance into [0, 1]. A hand that wasn't seen yields 0.
    pub fn normalize(&self, distance: Option<f32>) -> f32 {
        match distance {
            Some(distance) => ((distance - self.min) / (self.max - self.min)).clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}

impl Default for HandRange {
    fn default() -> Self {
        HandRange { min: 0.0, max: 1.0 }
    }
}

/// The two control scalars derived from one gesture frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSignal {
    pub volume: f32,
    pub speed_bias: f32,
}

/// Per-hand ranges used to turn distances into control signals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    left: HandRange,
    right: HandRange,
}

impl Calibration {
    pub fn new(left: HandRange, right: HandRange) -> Calibration {
        Calibration { left, right }
    }

    /// Returns the range for the given hand.
    pub fn range(&self, hand: Hand) -> HandRange {
        match hand {
            Hand::Left => self.left,
            Hand::Right => self.right,
        }
    }

    /// Converts raw distances into a volume (left hand) and a speed bias (right hand).
    pub fn signals(&self, left: Option<f32>, right: Option<f32>) -> GestureSignal {
        let signal = GestureSignal {
            volume: self.left.normalize(left),
            speed_bias: self.right.normalize(right),
        };
        debug!(
            left,
            right,
            volume = signal.volume,
            speed_bias = signal.speed_bias,
            "Gesture signals"
        );
        signal
    }
}

/// The calibration phase an observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fingers pinched together. Records the smallest distance.
    Pinch,
    /// Fingers spread apart. Records the largest distance.
    Extend,
}

/// Accumulates observations across the pinch and extend phases.
#[derive(Debug, Default)]
pub struct Calibrator {
    left: Extremes,
    right: Extremes,
}

#[derive(Debug, Default, Clone, Copy)]
struct Extremes {
    min: Option<f32>,
    max: Option<f32>,
}

impl Extremes {
    fn observe(&mut self, phase: Phase, distance: f32) {
        match phase {
            Phase::Pinch => self.min = Some(self.min.map_or(distance, |min| min.min(distance))),
            Phase::Extend => self.max = Some(self.max.map_or(distance, |max| max.max(distance))),
        }
    }

    fn to_range(self) -> HandRange {
        let default = HandRange::default();
        HandRange::new(
            self.min.unwrap_or(default.min),
            self.max.unwrap_or(default.max),
        )
    }
}

impl Calibrator {
    pub fn new() -> Calibrator {
        Calibrator::default()
    }

    /// Records one distance for the given hand.
    pub fn observe(&mut self, phase: Phase, hand: Hand, distance: f32) {
        match hand {
            Hand::Left => self.left.observe(phase, distance),
            Hand::Right => self.right.observe(phase, distance),
        }
    }

    /// Records one frame, skipping hands that weren't detected.
    pub fn observe_frame(&mut self, phase: Phase, left: Option<f32>, right: Option<f32>) {
        if let Some(left) = left {
            self.observe(phase, Hand::Left, left);
        }
        if let Some(right) = right {
            self.observe(phase, Hand::Right, right);
        }
    }

    /// Produces the calibration. A bound never observed falls back to [0, 1].
    pub fn finish(self) -> Calibration {
        let calibration = Calibration::new(self.left.to_range(), self.right.to_range());
        info!(
            left_min = calibration.left.min,
            left_max = calibration.left.max,
            right_min = calibration.right.min,
            right_max = calibration.right.max,
            "Calibration finished."
        );
        calibration
    }
}
