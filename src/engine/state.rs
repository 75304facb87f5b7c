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

//! Playback state shared between the control context and the audio callback.
//!
//! Every field is its own atomic so the render path never takes a lock. Reads of
//! different fields are not atomic with respect to each other; a block rendered with
//! a stale volume or speed is acceptable.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// The lowest speed factor a speed bias of 0.0 maps to.
pub const MIN_SPEED_FACTOR: f32 = 0.5;

/// The play/pause/stop state of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Playing,
    Paused,
}

impl Transport {
    fn to_u8(self) -> u8 {
        match self {
            Transport::Stopped => 0,
            Transport::Playing => 1,
            Transport::Paused => 2,
        }
    }

    fn from_u8(value: u8) -> Transport {
        match value {
            1 => Transport::Playing,
            2 => Transport::Paused,
            _ => Transport::Stopped,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Stopped => "stopped",
            Transport::Playing => "playing",
            Transport::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

/// Maps a normalized speed bias onto a speed factor. A bias in [0, 1] yields [0.5, 1.5].
pub fn speed_factor_for_bias(speed_bias: f32) -> f32 {
    MIN_SPEED_FACTOR + speed_bias
}

/// Mutable playback state.
pub struct PlaybackState {
    /// Floating index into the sample buffer, stored as f64 bits.
    position: AtomicU64,
    /// Output gain, stored as f32 bits.
    volume: AtomicU32,
    /// Cursor advance per output frame, stored as f32 bits.
    speed_factor: AtomicU32,
    transport: AtomicU8,
    /// Set when the cursor ran off the end of the buffer, cleared when a session ends.
    reached_end: AtomicBool,
}

impl PlaybackState {
    pub fn new() -> PlaybackState {
        PlaybackState {
            position: AtomicU64::new(0f64.to_bits()),
            volume: AtomicU32::new(1f32.to_bits()),
            speed_factor: AtomicU32::new(1f32.to_bits()),
            transport: AtomicU8::new(Transport::Stopped.to_u8()),
            reached_end: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_position(&self, position: f64) {
        self.position.store(position.to_bits(), Ordering::Release);
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn speed_factor(&self) -> f32 {
        f32::from_bits(self.speed_factor.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_speed_factor(&self, speed_factor: f32) {
        self.speed_factor
            .store(speed_factor.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn transport(&self) -> Transport {
        Transport::from_u8(self.transport.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_transport(&self, transport: Transport) {
        self.transport.store(transport.to_u8(), Ordering::Release);
    }

    #[inline]
    pub fn reached_end(&self) -> bool {
        self.reached_end.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_reached_end(&self, reached_end: bool) {
        self.reached_end.store(reached_end, Ordering::Release);
    }

    /// Moves from `current` to `new` only if the transport is still `current`.
    /// Returns true if the transition happened.
    #[inline]
    pub fn transition(&self, current: Transport, new: Transport) -> bool {
        self.transport
            .compare_exchange(
                current.to_u8(),
                new.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackState")
            .field("position", &self.position())
            .field("volume", &self.volume())
            .field("speed_factor", &self.speed_factor())
            .field("transport", &self.transport())
            .field("reached_end", &self.reached_end())
            .finish()
    }
}
