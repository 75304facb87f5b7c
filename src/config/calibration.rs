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
use serde::Deserialize;

use crate::gesture;

/// A YAML representation of one hand's pinch range.
#[derive(Deserialize, Clone, Copy, Debug)]
pub struct HandRange {
    min: f32,
    max: f32,
}

/// A YAML representation of a saved gesture calibration. A missing hand uses [0, 1].
#[derive(Deserialize, Clone, Debug)]
pub struct Calibration {
    left: Option<HandRange>,
    right: Option<HandRange>,
}

impl Calibration {
    /// Converts this into a gesture calibration.
    pub fn to_calibration(&self) -> gesture::Calibration {
        let range = |range: Option<HandRange>| {
            range
                .map(|range| gesture::HandRange::new(range.min, range.max))
                .unwrap_or_default()
        };
        gesture::Calibration::new(range(self.left), range(self.right))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_hand_uses_identity() {
        let calibration = Calibration {
            left: Some(HandRange { min: 0.5, max: 0.1 }),
            right: None,
        }
        .to_calibration();

        let left = calibration.range(gesture::Hand::Left);
        assert_eq!(0.5, left.min());
        assert!((left.max() - 0.6).abs() < 1e-6);
        assert_eq!(
            gesture::HandRange::default(),
            calibration.range(gesture::Hand::Right)
        );
    }
}
