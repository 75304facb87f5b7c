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

/// The device used when none is configured.
pub(super) const DEFAULT_DEVICE: &str = "default";

/// Frames rendered per callback chunk when not configured.
pub const DEFAULT_BLOCK_FRAMES: usize = 512;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone)]
pub struct Audio {
    /// The audio device.
    device: String,

    /// Frames rendered per render callback chunk (default: 512).
    block_frames: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            block_frames: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the frames per render chunk. Never zero.
    pub fn block_frames(&self) -> usize {
        self.block_frames.unwrap_or(DEFAULT_BLOCK_FRAMES).max(1)
    }
}
