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

//! The variable-rate render callback.
//!
//! Speed changes are done by nearest-below index resampling: each output frame reads
//! `source[floor(position + i * speed_factor)]`. A factor above 1 skips samples (faster,
//! higher pitch), below 1 repeats them (slower, lower pitch). There is no interpolation,
//! so extreme factors alias audibly.

use std::sync::Arc;

use crate::audio::{RenderStatus, Renderer, SampleBuffer};

use super::state::{PlaybackState, Transport};

/// The result of rendering one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockOutcome {
    /// The cursor after the block, clamped to `[0, source.len()]`.
    pub position: f64,
    /// True if the cursor reached the end of the source during this block.
    pub end_of_stream: bool,
}

/// Renders `output.len()` frames from `source` starting at `position`.
///
/// Output slots whose index falls at or past the end of the source are zero-filled.
pub fn resample_block(
    source: &[f32],
    position: f64,
    speed_factor: f32,
    volume: f32,
    output: &mut [f32],
) -> BlockOutcome {
    let len = source.len();
    if len == 0 {
        output.fill(0.0);
        return BlockOutcome {
            position: 0.0,
            end_of_stream: true,
        };
    }

    let end = len as f64;
    let last = len - 1;
    let speed = speed_factor as f64;
    for (i, out) in output.iter_mut().enumerate() {
        let index = position + i as f64 * speed;
        *out = if index >= end {
            0.0
        } else {
            source[(index.floor().max(0.0) as usize).min(last)] * volume
        };
    }

    let next = (position + output.len() as f64 * speed).max(0.0);
    if next >= end {
        BlockOutcome {
            position: end,
            end_of_stream: true,
        }
    } else {
        BlockOutcome {
            position: next,
            end_of_stream: false,
        }
    }
}

/// The renderer for one playback session. It shares the buffer and the state with the
/// engine and is the only writer of the cursor while the stream runs.
pub struct SessionRenderer {
    buffer: Arc<SampleBuffer>,
    state: Arc<PlaybackState>,
}

impl SessionRenderer {
    pub fn new(buffer: Arc<SampleBuffer>, state: Arc<PlaybackState>) -> SessionRenderer {
        SessionRenderer { buffer, state }
    }
}

impl Renderer for SessionRenderer {
    fn render(&mut self, output: &mut [f32]) -> RenderStatus {
        if self.state.transport() != Transport::Playing {
            output.fill(0.0);
            return RenderStatus::Halt;
        }

        let outcome = resample_block(
            self.buffer.samples(),
            self.state.position(),
            self.state.speed_factor(),
            self.state.volume(),
            output,
        );
        self.state.set_position(outcome.position);

        if outcome.end_of_stream {
            // A pause that raced with the last block wins.
            if self.state.transition(Transport::Playing, Transport::Stopped) {
                self.state.set_reached_end(true);
            }
            return RenderStatus::Halt;
        }
        RenderStatus::Continue
    }
}
