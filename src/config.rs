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
use std::path::Path;

use ::config::{Config, File};
use serde::Deserialize;

mod audio;
mod calibration;
mod controller;
mod error;

pub use self::audio::{Audio, DEFAULT_BLOCK_FRAMES};
pub use self::calibration::{Calibration, HandRange};
pub use self::controller::{Controller, DEFAULT_PROGRESS_INTERVAL};
pub use self::error::ConfigError;

/// The configuration for the player. Every section is optional.
#[derive(Deserialize, Default)]
pub struct Player {
    /// The audio output configuration.
    audio: Option<Audio>,
    /// Pinch ranges learned from an earlier calibration.
    calibration: Option<Calibration>,
    /// Controller settings.
    controller: Option<Controller>,
}

impl Player {
    /// Parses a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?)
    }

    /// Returns the audio configuration, using the default device if none was given.
    pub fn audio(&self) -> Audio {
        self.audio
            .clone()
            .unwrap_or_else(|| Audio::new(audio::DEFAULT_DEVICE))
    }

    /// Returns the gesture calibration.
    pub fn calibration(&self) -> crate::gesture::Calibration {
        self.calibration
            .as_ref()
            .map(Calibration::to_calibration)
            .unwrap_or_default()
    }

    /// Returns the controller configuration.
    pub fn controller(&self) -> Controller {
        self.controller.clone().unwrap_or_default()
    }
}
