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
use crate::audio::{DeviceError, LoadError};

/// Errors surfaced to the control context by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load song: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The operation doesn't apply to the current transport state. Callers treat this
    /// as a no-op.
    #[error("invalid transport state: {0}")]
    InvalidState(&'static str),
}
