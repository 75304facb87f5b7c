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
use std::any::Any;
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod loader;
pub mod mock;
pub mod thread_priority;

pub use loader::{LoadError, SampleBuffer};

/// What the render callback wants the audio layer to do after filling a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Keep invoking the callback.
    Continue,
    /// Stop invoking the callback. The block that returned this is still played.
    Halt,
}

/// A pull-based render callback. The audio layer calls `render` repeatedly from its
/// real-time context with a mono output block to fill.
///
/// Implementations must not block, allocate, or take locks with unbounded waits.
pub trait Renderer: Send + 'static {
    fn render(&mut self, output: &mut [f32]) -> RenderStatus;
}

/// A running output stream. Dropping the stream closes it; once the drop returns,
/// the renderer is no longer being invoked.
pub trait OutputStream: Send {
    /// Returns true once the renderer has returned `RenderStatus::Halt`.
    fn is_halted(&self) -> bool;
}

/// Errors raised while acquiring or driving an output device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no device found with name {0}")]
    NotFound(String),

    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("output stream error: {0}")]
    Stream(String),

    #[error("output thread error: {0}")]
    Thread(String),
}

pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// Opens a mono output stream at the given sample rate that pulls from the renderer.
    fn open(
        &self,
        sample_rate: u32,
        renderer: Box<dyn Renderer>,
    ) -> Result<Box<dyn OutputStream>, DeviceError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, config.block_frames())));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
