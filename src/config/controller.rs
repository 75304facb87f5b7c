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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

/// How often the controller reports progress when not configured.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// A YAML representation of the controller configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Controller {
    /// How often to report playback progress, e.g. "250ms".
    progress_interval: Option<String>,
}

impl Controller {
    /// Returns the progress reporting interval.
    pub fn progress_interval(&self) -> Result<Duration, ConfigError> {
        match &self.progress_interval {
            Some(interval_string) => {
                let interval: Duration = DurationString::from_string(interval_string.clone())
                    .map_err(|e| ConfigError::Duration(interval_string.clone(), e.to_string()))?
                    .into();
                if interval.is_zero() {
                    return Err(ConfigError::Duration(
                        interval_string.clone(),
                        "progress interval must be positive".to_string(),
                    ));
                }
                Ok(interval)
            }
            None => Ok(DEFAULT_PROGRESS_INTERVAL),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_progress_interval() -> Result<(), ConfigError> {
        let controller = Controller::default();
        assert_eq!(DEFAULT_PROGRESS_INTERVAL, controller.progress_interval()?);

        let controller = Controller {
            progress_interval: Some("100ms".to_string()),
        };
        assert_eq!(Duration::from_millis(100), controller.progress_interval()?);

        let controller = Controller {
            progress_interval: Some("soon".to_string()),
        };
        assert!(matches!(
            controller.progress_interval(),
            Err(ConfigError::Duration(..))
        ));

        let controller = Controller {
            progress_interval: Some("0ms".to_string()),
        };
        match controller.progress_interval() {
            Err(ConfigError::Duration(interval, _)) => assert_eq!("0ms", interval),
            other => panic!("expected a duration error, got {:?}", other),
        }
        Ok(())
    }
}
