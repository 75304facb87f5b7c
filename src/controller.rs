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
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::engine::{EngineError, PlaybackEngine, Transport};
use crate::gesture::{Calibration, Calibrator, Phase};
use crate::util::progress_display;

pub mod keyboard;

/// Controller events that will trigger behavior in the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Raw pinch distances for each hand, `None` for a hand that wasn't detected.
    Gesture {
        left: Option<f32>,
        right: Option<f32>,
    },

    /// Control values that are already normalized.
    Controls { volume: f32, speed_bias: f32 },

    /// Feeds or finishes a gesture calibration.
    Calibrate(CalibrationStep),

    /// Plays the given song, or the last song if none is given. Resumes if paused on
    /// the same song.
    Play(Option<PathBuf>),

    /// Pauses playback.
    Pause,

    /// Resumes paused playback.
    Resume,

    /// Pauses if playing, otherwise plays the last song.
    TogglePlayPause,

    /// Stops playback.
    Stop,

    /// Stops playback and shuts the controller down.
    Quit,
}

/// One step of a calibration run: observations for the pinch and extend phases, then
/// a finish that swaps the result in.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationStep {
    Observe {
        phase: Phase,
        left: Option<f32>,
        right: Option<f32>,
    },
    Finish,
}

impl Event {
    /// Returns true if handling the event may open or close the output stream or decode
    /// a file.
    fn blocks(&self) -> bool {
        matches!(
            self,
            Event::Play(_)
                | Event::Pause
                | Event::Resume
                | Event::TogglePlayPause
                | Event::Stop
        )
    }
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a playback engine from a stream of events.
pub struct Controller {
    handle: JoinHandle<()>,
}

/// What the event loop keeps between events.
struct Session {
    engine: Arc<PlaybackEngine>,
    calibration: Calibration,
    calibrator: Option<Calibrator>,
    last_source: Option<PathBuf>,
}

impl Controller {
    /// Creates a new controller with the given driver. If `source` is given, it starts
    /// playing right away.
    pub fn new(
        engine: Arc<PlaybackEngine>,
        driver: Arc<dyn Driver>,
        calibration: Calibration,
        progress_interval: Duration,
        source: Option<PathBuf>,
    ) -> Controller {
        let session = Arc::new(Mutex::new(Session {
            engine: engine.clone(),
            calibration,
            calibrator: None,
            last_source: None,
        }));
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(session, engine, driver, progress_interval, source)
                    .instrument(span),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from the driver and reports progress until told to quit, the driver
    /// closes, or the song plays to the end.
    async fn trigger_events(
        session: Arc<Mutex<Session>>,
        engine: Arc<PlaybackEngine>,
        driver: Arc<dyn Driver>,
        progress_interval: Duration,
        source: Option<PathBuf>,
    ) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        let mut ticker = tokio::time::interval(progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and there's nothing to report yet.
        ticker.tick().await;

        info!("Controller started.");
        if let Some(source) = source {
            Controller::dispatch(&session, Event::Play(Some(source))).await;
        }

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(Event::Quit) => {
                        info!("Quit requested.");
                        break;
                    }
                    Some(event) => Controller::dispatch(&session, event).await,
                    None => {
                        info!("Controller closing.");
                        if let Err(e) = join_handle.await {
                            error!("Error waiting for event monitor to stop: {}", e);
                        }
                        break;
                    }
                },
                _ = ticker.tick() => Controller::report_progress(&engine),
            }

            if engine.reached_end() {
                info!("Playback finished.");
                break;
            }
        }

        let stopped = tokio::task::spawn_blocking(move || engine.stop()).await;
        if let Err(e) = stopped {
            error!("Error stopping playback: {}", e);
        }
    }

    /// Handles one event. Anything that touches the output stream runs on the blocking
    /// pool so the ticker and the event channel keep moving.
    async fn dispatch(session: &Arc<Mutex<Session>>, event: Event) {
        debug!(event = format!("{:?}", event), "Received event.");
        if !event.blocks() {
            session.lock().handle_event(event);
            return;
        }

        let session = session.clone();
        let handled = tokio::task::spawn_blocking(move || session.lock().handle_event(event)).await;
        if let Err(e) = handled {
            error!("Error waiting for engine: {}", e);
        }
    }

    fn report_progress(engine: &PlaybackEngine) {
        let transport = engine.transport();
        if transport == Transport::Stopped {
            return;
        }
        let (elapsed, duration) = engine.progress();
        info!(
            progress = progress_display(elapsed, duration),
            transport = transport.to_string(),
            volume = engine.volume(),
            speed_factor = engine.speed_factor(),
            "Progress"
        );
    }
}

impl Session {
    fn handle_event(&mut self, event: Event) {
        let result = match event {
            Event::Gesture { left, right } => {
                let signal = self.calibration.signals(left, right);
                self.engine.set_controls(signal.volume, signal.speed_bias);
                Ok(())
            }
            Event::Controls { volume, speed_bias } => {
                self.engine.set_controls(volume, speed_bias);
                Ok(())
            }
            Event::Calibrate(step) => {
                self.calibrate(step);
                Ok(())
            }
            Event::Play(source) => self.play(source),
            Event::Pause => {
                self.engine.pause();
                Ok(())
            }
            Event::Resume => self.engine.resume(),
            Event::TogglePlayPause => match self.engine.toggle_play_pause() {
                Err(EngineError::InvalidState(_)) if self.last_source.is_some() => self.play(None),
                result => result,
            },
            Event::Stop => {
                self.engine.stop();
                Ok(())
            }
            Event::Quit => Ok(()),
        };

        match result {
            Ok(()) => {}
            Err(EngineError::InvalidState(reason)) => warn!(reason, "Ignored event."),
            Err(e) => error!("Error talking to engine: {}", e),
        }
    }

    fn calibrate(&mut self, step: CalibrationStep) {
        match step {
            CalibrationStep::Observe { phase, left, right } => self
                .calibrator
                .get_or_insert_with(|| {
                    info!("Calibration started.");
                    Calibrator::new()
                })
                .observe_frame(phase, left, right),
            CalibrationStep::Finish => match self.calibrator.take() {
                Some(calibrator) => self.calibration = calibrator.finish(),
                None => warn!("No calibration in progress."),
            },
        }
    }

    /// Starts `source`, falling back to the last song. A different song replaces a
    /// paused one rather than resuming it.
    fn play(&mut self, source: Option<PathBuf>) -> Result<(), EngineError> {
        let source = match source {
            Some(source) => {
                if self.last_source.as_ref() != Some(&source) {
                    self.engine.stop();
                }
                source
            }
            None if self.engine.transport() == Transport::Paused => {
                return self.engine.resume();
            }
            None => self
                .last_source
                .clone()
                .ok_or(EngineError::InvalidState("no song to play"))?,
        };

        self.engine.start(Some(&source))?;
        self.last_source = Some(source);
        Ok(())
    }
}
