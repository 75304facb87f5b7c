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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

#[cfg(test)]
use std::error::Error;

use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::{DeviceError, OutputStream, RenderStatus, Renderer};

static STREAM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The stream currently attached to a mock device.
struct ActiveStream {
    id: u64,
    renderer: Box<dyn Renderer>,
    halted: Arc<AtomicBool>,
}

#[derive(Default)]
struct Shared {
    active: Option<ActiveStream>,
    opened: usize,
    closed: usize,
    last_sample_rate: Option<u32>,
    fail_next_open: bool,
}

/// A mock device. Doesn't actually play anything.
///
/// A clocked mock pulls blocks from the renderer on its own thread at real-time pace.
/// A manual mock only renders when `pull` is called, which lets tests step the
/// render callback one block at a time.
#[derive(Clone)]
pub struct Device {
    name: String,
    block_frames: usize,
    clocked: bool,
    shared: Arc<Mutex<Shared>>,
}

impl Device {
    /// Gets the given clocked mock device.
    pub fn get(name: &str, block_frames: usize) -> Device {
        Device {
            name: name.to_string(),
            block_frames: block_frames.max(1),
            clocked: true,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Gets a mock device that is only driven by `pull`.
    pub fn manual(name: &str) -> Device {
        Device {
            clocked: false,
            ..Device::get(name, 1)
        }
    }

    /// Invokes the render callback of the open stream for one block of `frames`.
    /// Returns None if no stream is open or the stream has halted.
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        Self::pull_stream(&self.shared, None, frames)
    }

    /// Pulls up to `blocks` blocks, stopping early if the stream halts, and returns the
    /// concatenated output.
    pub fn pull_blocks(&self, blocks: usize, frames: usize) -> Vec<f32> {
        let mut output = Vec::with_capacity(blocks * frames);
        for _ in 0..blocks {
            match self.pull(frames) {
                Some(block) => output.extend_from_slice(&block),
                None => break,
            }
        }
        output
    }

    /// Makes the next call to `open` fail as if the device were busy.
    pub fn fail_next_open(&self) {
        self.shared.lock().fail_next_open = true;
    }

    /// Returns true if a stream is open and still rendering.
    pub fn is_playing(&self) -> bool {
        self.shared
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| !active.halted.load(Ordering::Acquire))
    }

    /// Returns true if a stream is open, halted or not.
    pub fn is_open(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    /// Returns how many streams have been opened.
    pub fn opened_count(&self) -> usize {
        self.shared.lock().opened
    }

    /// Returns how many streams have been closed.
    pub fn closed_count(&self) -> usize {
        self.shared.lock().closed
    }

    /// Returns the sample rate of the last stream opened.
    pub fn last_sample_rate(&self) -> Option<u32> {
        self.shared.lock().last_sample_rate
    }

    fn pull_stream(shared: &Mutex<Shared>, id: Option<u64>, frames: usize) -> Option<Vec<f32>> {
        let mut shared = shared.lock();
        let active = shared.active.as_mut()?;
        if id.is_some_and(|id| id != active.id) || active.halted.load(Ordering::Acquire) {
            return None;
        }

        let mut block = vec![0.0f32; frames];
        if active.renderer.render(&mut block) == RenderStatus::Halt {
            active.halted.store(true, Ordering::Release);
        }
        Some(block)
    }

    /// Paces blocks at the given sample rate until the stream halts or is closed.
    fn spawn_pacer(&self, id: u64, sample_rate: u32, closed: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        let shared = self.shared.clone();
        let block_frames = self.block_frames;
        let block_duration =
            Duration::from_secs_f64(block_frames as f64 / sample_rate.max(1) as f64);
        thread::spawn(move || {
            let span = span!(Level::DEBUG, "mock pacer");
            let _enter = span.enter();

            while !closed.load(Ordering::Acquire) {
                spin_sleep::sleep(block_duration);
                if Self::pull_stream(&shared, Some(id), block_frames).is_none() {
                    break;
                }
            }
            debug!(id, "Mock pacer finished");
        })
    }
}

/// A stream opened on a mock device.
struct Stream {
    id: u64,
    shared: Arc<Mutex<Shared>>,
    halted: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    pacer: Option<thread::JoinHandle<()>>,
}

impl OutputStream for Stream {
    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        {
            let mut shared = self.shared.lock();
            if shared.active.as_ref().is_some_and(|active| active.id == self.id) {
                shared.active = None;
            }
            shared.closed += 1;
        }
        if let Some(pacer) = self.pacer.take() {
            let _ = pacer.join();
        }
    }
}

impl super::Device for Device {
    fn open(
        &self,
        sample_rate: u32,
        renderer: Box<dyn Renderer>,
    ) -> Result<Box<dyn OutputStream>, DeviceError> {
        let id = STREAM_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let halted = Arc::new(AtomicBool::new(false));
        {
            let mut shared = self.shared.lock();
            if shared.fail_next_open {
                shared.fail_next_open = false;
                return Err(DeviceError::Unavailable(format!(
                    "{} is busy",
                    self.name
                )));
            }
            shared.active = Some(ActiveStream {
                id,
                renderer,
                halted: halted.clone(),
            });
            shared.opened += 1;
            shared.last_sample_rate = Some(sample_rate);
        }

        info!(device = self.name, sample_rate, "Opened mock stream.");

        let closed = Arc::new(AtomicBool::new(false));
        let pacer = self
            .clocked
            .then(|| self.spawn_pacer(id, sample_rate, closed.clone()));
        Ok(Box::new(Stream {
            id,
            shared: self.shared.clone(),
            halted,
            closed,
            pacer,
        }))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
