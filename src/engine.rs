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

//! Single-song variable-rate playback.
//!
//! The engine owns one decoded song and a [`PlaybackState`] shared with the render
//! callback. Control operations run on the caller's thread and may block briefly while
//! the output stream opens or closes. The render callback never takes the session lock.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use crate::audio::{Device, OutputStream, SampleBuffer};

mod error;
mod render;
mod state;

pub use error::EngineError;
pub use render::{resample_block, BlockOutcome, SessionRenderer};
pub use state::{speed_factor_for_bias, PlaybackState, Transport, MIN_SPEED_FACTOR};

/// The loaded song and the stream currently rendering it.
#[derive(Default)]
struct Session {
    buffer: Option<Arc<SampleBuffer>>,
    stream: Option<Box<dyn OutputStream>>,
}

/// Plays one song at a time with live volume and speed control.
pub struct PlaybackEngine {
    device: Arc<dyn Device>,
    state: Arc<PlaybackState>,
    session: Mutex<Session>,
}

impl PlaybackEngine {
    /// Creates a stopped engine that plays through the given device.
    pub fn new(device: Arc<dyn Device>) -> PlaybackEngine {
        PlaybackEngine {
            device,
            state: Arc::new(PlaybackState::new()),
            session: Mutex::new(Session::default()),
        }
    }

    /// Starts playback.
    ///
    /// If paused, playback resumes from the retained position and `source` is ignored.
    /// Otherwise any current session is stopped, `source` is loaded, and playback starts
    /// from zero. On failure the engine is left stopped.
    pub fn start(&self, source: Option<&Path>) -> Result<(), EngineError> {
        if self.state.transport() == Transport::Paused {
            return self.resume();
        }
        let source = source.ok_or(EngineError::InvalidState("no song to start"))?;

        let span = span!(Level::INFO, "start playback");
        let _enter = span.enter();

        // Decode before taking the session lock so progress polling isn't held up.
        let loaded = SampleBuffer::load(source);

        let mut session = self.session.lock();
        self.stop_session(&mut session);
        let buffer = Arc::new(loaded?);

        session.buffer = Some(buffer.clone());
        self.state.set_position(0.0);
        if let Err(e) = self.open_stream(&mut session, buffer) {
            self.stop_session(&mut session);
            return Err(e);
        }

        info!(
            path = ?source,
            volume = self.state.volume(),
            speed_factor = self.state.speed_factor(),
            "Playback started."
        );
        Ok(())
    }

    /// Pauses playback, retaining the position and releasing the output stream.
    /// Does nothing unless playing.
    pub fn pause(&self) {
        let mut session = self.session.lock();
        if !self.state.transition(Transport::Playing, Transport::Paused) {
            debug!(
                transport = self.state.transport().to_string(),
                "Pause ignored."
            );
            return;
        }

        // Dropping the stream waits for any in-flight callback.
        drop(session.stream.take());
        info!(position = self.state.position(), "Paused playback.");
    }

    /// Resumes a paused session from its retained position.
    pub fn resume(&self) -> Result<(), EngineError> {
        let mut session = self.session.lock();
        if self.state.transport() != Transport::Paused {
            return Err(EngineError::InvalidState("nothing is paused"));
        }
        let buffer = session
            .buffer
            .clone()
            .ok_or(EngineError::InvalidState("no song loaded"))?;

        if let Err(e) = self.open_stream(&mut session, buffer) {
            self.state.set_transport(Transport::Paused);
            return Err(e);
        }
        info!(position = self.state.position(), "Resumed playback.");
        Ok(())
    }

    /// Stops playback, resets the position, and releases the stream and the song.
    /// Safe to call in any state.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        let was_loaded = session.buffer.is_some();
        self.stop_session(&mut session);
        if was_loaded {
            info!("Stopped playback.");
        }
    }

    /// Pauses if playing, otherwise starts with no new source. From Stopped this returns
    /// `InvalidState`; callers that want a restart must supply the source again.
    pub fn toggle_play_pause(&self) -> Result<(), EngineError> {
        if self.transport() == Transport::Playing {
            self.pause();
            Ok(())
        } else {
            self.start(None)
        }
    }

    /// Sets the volume and maps `speed_bias` onto `speed_factor = 0.5 + speed_bias`.
    /// Neither value is clamped. Takes effect at the next render block.
    pub fn set_controls(&self, volume: f32, speed_bias: f32) {
        self.state.set_volume(volume);
        self.state.set_speed_factor(speed_factor_for_bias(speed_bias));
    }

    /// Returns `(elapsed_seconds, duration_seconds)`, or `(0, 0)` if nothing is loaded.
    pub fn progress(&self) -> (f64, f64) {
        let session = self.session.lock();
        self.reap_dead_stream(&session);
        match &session.buffer {
            Some(buffer) if buffer.sample_rate() > 0 => (
                self.state.position() / buffer.sample_rate() as f64,
                buffer.duration_secs(),
            ),
            _ => (0.0, 0.0),
        }
    }

    /// Returns the transport state.
    pub fn transport(&self) -> Transport {
        let session = self.session.lock();
        self.reap_dead_stream(&session);
        self.state.transport()
    }

    pub fn volume(&self) -> f32 {
        self.state.volume()
    }

    pub fn speed_factor(&self) -> f32 {
        self.state.speed_factor()
    }

    /// Returns true if the current song played to its end. Cleared by the next `start`
    /// or `stop`.
    pub fn reached_end(&self) -> bool {
        self.state.reached_end()
    }

    /// Returns true if a song is loaded.
    pub fn is_loaded(&self) -> bool {
        self.session.lock().buffer.is_some()
    }

    /// Returns the current cursor as a floating sample index.
    pub fn position(&self) -> f64 {
        self.state.position()
    }

    fn open_stream(
        &self,
        session: &mut Session,
        buffer: Arc<SampleBuffer>,
    ) -> Result<(), EngineError> {
        let sample_rate = buffer.sample_rate();
        let renderer = SessionRenderer::new(buffer, self.state.clone());

        // The first callback may run before open returns.
        self.state.set_transport(Transport::Playing);
        session.stream = Some(self.device.open(sample_rate, Box::new(renderer))?);
        Ok(())
    }

    fn stop_session(&self, session: &mut Session) {
        self.state.set_transport(Transport::Stopped);
        self.state.set_reached_end(false);
        // Close the stream before touching the cursor so a late callback can't overwrite it.
        drop(session.stream.take());
        self.state.set_position(0.0);
        session.buffer = None;
    }

    /// A stream that halted while the transport still says Playing has lost its device.
    fn reap_dead_stream(&self, session: &Session) {
        let dead = session
            .stream
            .as_ref()
            .is_some_and(|stream| stream.is_halted());
        if dead && self.state.transition(Transport::Playing, Transport::Stopped) {
            warn!("Output stream halted unexpectedly, stopping playback.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::audio::mock;
    use crate::testutil::{eventually, sine_wave, write_wav};

    const FRAMES: usize = 512;

    fn engine() -> (PlaybackEngine, mock::Device) {
        let device = mock::Device::manual("mock");
        (PlaybackEngine::new(Arc::new(device.clone())), device)
    }

    fn song(samples: Vec<f32>, sample_rate: u32) -> Result<(TempDir, PathBuf), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("song.wav");
        write_wav(path.clone(), vec![samples], sample_rate)?;
        Ok((dir, path))
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    #[test]
    fn test_initial_state() {
        let (engine, device) = engine();
        assert_eq!(Transport::Stopped, engine.transport());
        assert_eq!((0.0, 0.0), engine.progress());
        assert!(!engine.is_loaded());
        assert!(!device.is_open());
    }

    #[test]
    fn test_start_plays_identity_at_unity() -> Result<(), Box<dyn Error>> {
        let samples = ramp(4096);
        let (_dir, path) = song(samples.clone(), 44100)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        assert_eq!(Transport::Playing, engine.transport());
        assert_eq!(Some(44100), device.last_sample_rate());

        let output = device.pull_blocks(4, FRAMES);
        assert_eq!(&samples[..4 * FRAMES], output.as_slice());
        Ok(())
    }

    #[test]
    fn test_progress_tracks_speed() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.0; 44100], 44100)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        engine.set_controls(1.0, 0.75);
        assert_eq!(1.25, engine.speed_factor());

        device.pull_blocks(10, FRAMES);
        let (elapsed, duration) = engine.progress();
        assert_eq!((10 * FRAMES) as f64 * 1.25 / 44100.0, elapsed);
        assert_eq!(1.0, duration);
        Ok(())
    }

    #[test]
    fn test_five_seconds_of_a_ten_second_song() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(sine_wave(440.0, 44100, 10.0), 44100)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        let blocks = (5 * 44100) / FRAMES;
        device.pull_blocks(blocks, FRAMES);

        let block_duration = FRAMES as f64 / 44100.0;
        let (elapsed, duration) = engine.progress();
        assert!((elapsed - 5.0).abs() <= block_duration);
        assert!((duration - 10.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_set_controls_maps_speed_bias() {
        let (engine, _) = engine();

        engine.set_controls(0.0, 1.0);
        assert_eq!(1.5, engine.speed_factor());
        assert_eq!(0.0, engine.volume());

        engine.set_controls(1.0, 0.0);
        assert_eq!(0.5, engine.speed_factor());
        assert_eq!(1.0, engine.volume());
    }

    #[test]
    fn test_controls_apply_at_next_block() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![1.0; 8192], 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        let first = device.pull(FRAMES).expect("stream should be open");
        assert!(first.iter().all(|&s| s == 1.0));

        engine.set_controls(0.5, 0.5);
        let second = device.pull(FRAMES).expect("stream should be open");
        assert!(second.iter().all(|&s| s == 0.5));
        Ok(())
    }

    #[test]
    fn test_pause_resume_preserves_position() -> Result<(), Box<dyn Error>> {
        let samples = ramp(8192);
        let (_dir, path) = song(samples.clone(), 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        engine.set_controls(1.0, 0.3);
        device.pull_blocks(3, FRAMES);
        let position = engine.position();

        engine.pause();
        assert_eq!(Transport::Paused, engine.transport());
        assert!(!device.is_open());
        assert_eq!(position, engine.position());

        engine.resume()?;
        assert_eq!(Transport::Playing, engine.transport());
        assert_eq!(position, engine.position());
        assert_eq!(2, device.opened_count());

        // Playback continues from the retained cursor.
        engine.set_controls(1.0, 0.5);
        let block = device.pull(4).expect("stream should be open");
        let start = position.floor() as usize;
        assert_eq!(&samples[start..start + 4], block.as_slice());
        Ok(())
    }

    #[test]
    fn test_start_while_paused_resumes_without_reloading() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.25; 4096], 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        device.pull_blocks(2, FRAMES);
        engine.pause();

        engine.start(Some(Path::new("/nonexistent/other.wav")))?;
        assert_eq!(Transport::Playing, engine.transport());
        assert_eq!((2 * FRAMES) as f64, engine.position());
        Ok(())
    }

    #[test]
    fn test_pause_is_noop_unless_playing() {
        let (engine, device) = engine();
        engine.pause();
        assert_eq!(Transport::Stopped, engine.transport());
        assert_eq!(0, device.opened_count());
    }

    #[test]
    fn test_resume_without_session_is_invalid_state() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.resume(),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            engine.start(None),
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(Transport::Stopped, engine.transport());
    }

    #[test]
    fn test_stop_is_idempotent() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.5; 4096], 8000)?;
        let (engine, device) = engine();

        engine.stop();
        assert_eq!(0.0, engine.position());
        assert_eq!(Transport::Stopped, engine.transport());

        engine.start(Some(&path))?;
        device.pull_blocks(2, FRAMES);
        engine.stop();
        engine.stop();
        assert_eq!(0.0, engine.position());
        assert_eq!(Transport::Stopped, engine.transport());
        assert_eq!((0.0, 0.0), engine.progress());
        assert!(!engine.is_loaded());
        assert!(!device.is_open());

        // Stopping from paused works too.
        engine.start(Some(&path))?;
        engine.pause();
        engine.stop();
        assert_eq!(Transport::Stopped, engine.transport());
        assert_eq!(0.0, engine.position());
        Ok(())
    }

    #[test]
    fn test_end_of_stream_stops_automatically() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![1.0; 1000], 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        let output = device.pull_blocks(10, FRAMES);
        // Two blocks: one full, one with the tail and zero fill.
        assert_eq!(2 * FRAMES, output.len());
        assert!(output[..1000].iter().all(|&s| s == 1.0));
        assert!(output[1000..].iter().all(|&s| s == 0.0));

        assert_eq!(Transport::Stopped, engine.transport());
        assert!(engine.reached_end());
        assert_eq!(1000.0, engine.position());
        let (elapsed, duration) = engine.progress();
        assert_eq!(duration, elapsed);
        assert!(device.pull(FRAMES).is_none());

        engine.stop();
        assert!(!engine.reached_end());
        Ok(())
    }

    #[test]
    fn test_controls_and_stop_while_rendering_on_another_thread() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(sine_wave(440.0, 8000, 5.0), 8000)?;
        let device = mock::Device::get("mock", 64);
        let engine = PlaybackEngine::new(Arc::new(device.clone()));

        engine.start(Some(&path))?;
        eventually(|| engine.position() > 0.0, "Pacer never rendered");

        let mut last_elapsed = 0.0;
        for i in 0..20 {
            engine.set_controls(0.5, (i % 3) as f32 * 0.5);
            let (elapsed, duration) = engine.progress();
            assert!(elapsed >= last_elapsed);
            assert!(elapsed <= duration);
            last_elapsed = elapsed;
            thread::sleep(Duration::from_millis(5));
        }
        assert!(device.is_playing());
        assert_eq!(Transport::Playing, engine.transport());

        engine.stop();
        assert_eq!(0.0, engine.position());
        assert_eq!(Transport::Stopped, engine.transport());
        assert!(!device.is_open());
        assert_eq!((0.0, 0.0), engine.progress());

        // Nothing renders after stop returns.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(0.0, engine.position());
        Ok(())
    }

    #[test]
    fn test_toggle_play_pause() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.5; 8192], 8000)?;
        let (engine, device) = engine();

        // From stopped there's nothing to resume.
        assert!(matches!(
            engine.toggle_play_pause(),
            Err(EngineError::InvalidState(_))
        ));

        engine.start(Some(&path))?;
        device.pull(FRAMES);
        engine.toggle_play_pause()?;
        assert_eq!(Transport::Paused, engine.transport());
        engine.toggle_play_pause()?;
        assert_eq!(Transport::Playing, engine.transport());
        assert_eq!(FRAMES as f64, engine.position());
        Ok(())
    }

    #[test]
    fn test_load_error_leaves_engine_stopped() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.5; 4096], 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        let result = engine.start(Some(Path::new("/nonexistent/song.wav")));
        assert!(matches!(result, Err(EngineError::Load(_))));
        assert_eq!(Transport::Stopped, engine.transport());
        assert!(!engine.is_loaded());
        assert!(!device.is_open());
        Ok(())
    }

    #[test]
    fn test_device_error_on_start() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.5; 4096], 8000)?;
        let (engine, device) = engine();

        device.fail_next_open();
        assert!(matches!(
            engine.start(Some(&path)),
            Err(EngineError::Device(_))
        ));
        assert_eq!(Transport::Stopped, engine.transport());
        assert!(!engine.is_loaded());
        Ok(())
    }

    #[test]
    fn test_device_error_on_resume_stays_paused() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.5; 4096], 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        device.pull(FRAMES);
        engine.pause();

        device.fail_next_open();
        assert!(matches!(engine.resume(), Err(EngineError::Device(_))));
        assert_eq!(Transport::Paused, engine.transport());
        assert_eq!(FRAMES as f64, engine.position());

        engine.resume()?;
        assert_eq!(Transport::Playing, engine.transport());
        Ok(())
    }

    #[test]
    fn test_start_replaces_current_song() -> Result<(), Box<dyn Error>> {
        let (_first_dir, first) = song(vec![0.25; 4096], 8000)?;
        let (_second_dir, second) = song(vec![0.75; 2048], 16000)?;
        let (engine, device) = engine();

        engine.start(Some(&first))?;
        device.pull_blocks(2, FRAMES);

        engine.start(Some(&second))?;
        assert_eq!(0.0, engine.position());
        assert_eq!(Some(16000), device.last_sample_rate());
        assert_eq!(1, device.closed_count());
        let block = device.pull(FRAMES).expect("stream should be open");
        assert!(block.iter().all(|&s| s == 0.75));
        assert_eq!((FRAMES as f64 / 16000.0, 2048.0 / 16000.0), engine.progress());
        Ok(())
    }

    #[test]
    fn test_controls_are_not_clamped() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = song(vec![0.5; 4096], 8000)?;
        let (engine, device) = engine();

        engine.start(Some(&path))?;
        engine.set_controls(2.0, 2.5);
        assert_eq!(3.0, engine.speed_factor());
        let block = device.pull(4).expect("stream should be open");
        assert_eq!(vec![1.0; 4], block);
        assert_eq!(12.0, engine.position());
        Ok(())
    }
}
