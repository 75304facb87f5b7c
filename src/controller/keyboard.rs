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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::{CalibrationStep, Event};
use crate::gesture::Phase;

const PLAY: &str = "play";
const PAUSE: &str = "pause";
const RESUME: &str = "resume";
const TOGGLE: &str = "toggle";
const STOP: &str = "stop";
const VOLUME: &str = "volume";
const SPEED: &str = "speed";
const GESTURE: &str = "gesture";
const CALIBRATE: &str = "calibrate";
const QUIT: &str = "quit";

const PINCH: &str = "pinch";
const EXTEND: &str = "extend";
const DONE: &str = "done";

/// Marks a hand that wasn't detected in a `gesture` command.
const MISSING_HAND: &str = "-";

/// The last typed control values, so `volume` and `speed` each change only one.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Controls {
    volume: f32,
    speed_bias: f32,
}

impl Default for Controls {
    fn default() -> Self {
        // A bias of 0.5 plays at normal speed.
        Controls {
            volume: 1.0,
            speed_bias: 0.5,
        }
    }
}

/// A controller that drives playback from typed commands.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and dispatches one command. Returns false once the input is exhausted or
    /// the user quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
        controls: &mut Controls,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} [path], {}, {}, {}, {}, {} <v>, {} <bias>, {} <left|-> <right|->, \
             {} {}|{} <left|-> <right|->, {} {}, {}): ",
            PLAY,
            PAUSE,
            RESUME,
            TOGGLE,
            STOP,
            VOLUME,
            SPEED,
            GESTURE,
            CALIBRATE,
            PINCH,
            EXTEND,
            CALIBRATE,
            DONE,
            QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let event = match parse_command(&input, controls) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(true),
            Err(reason) => {
                warn!(input = input.trim(), reason, "Unrecognized input");
                return Ok(true);
            }
        };

        if let Event::Controls { volume, speed_bias } = event {
            *controls = Controls { volume, speed_bias };
        }
        let keep_going = event != Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(keep_going)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses one line of input. Blank lines yield no event.
fn parse_command(input: &str, controls: &Controls) -> Result<Option<Event>, &'static str> {
    let mut parts = input.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };

    let event = match command.to_lowercase().as_str() {
        PLAY => {
            let rest: Vec<&str> = parts.by_ref().collect();
            let source = (!rest.is_empty()).then(|| PathBuf::from(rest.join(" ")));
            return Ok(Some(Event::Play(source)));
        }
        PAUSE => Event::Pause,
        RESUME => Event::Resume,
        TOGGLE => Event::TogglePlayPause,
        STOP => Event::Stop,
        QUIT => Event::Quit,
        VOLUME => Event::Controls {
            volume: parse_value(parts.next())?,
            speed_bias: controls.speed_bias,
        },
        SPEED => Event::Controls {
            volume: controls.volume,
            speed_bias: parse_value(parts.next())?,
        },
        GESTURE => Event::Gesture {
            left: parse_hand(parts.next())?,
            right: parse_hand(parts.next())?,
        },
        CALIBRATE => {
            let step = match parts.next().map(str::to_lowercase).as_deref() {
                Some(PINCH) => CalibrationStep::Observe {
                    phase: Phase::Pinch,
                    left: parse_hand(parts.next())?,
                    right: parse_hand(parts.next())?,
                },
                Some(EXTEND) => CalibrationStep::Observe {
                    phase: Phase::Extend,
                    left: parse_hand(parts.next())?,
                    right: parse_hand(parts.next())?,
                },
                Some(DONE) => CalibrationStep::Finish,
                _ => return Err("expected pinch, extend, or done"),
            };
            Event::Calibrate(step)
        }
        _ => return Err("unknown command"),
    };

    if parts.next().is_some() {
        return Err("too many arguments");
    }
    Ok(Some(event))
}

fn parse_value(value: Option<&str>) -> Result<f32, &'static str> {
    let value: f32 = value
        .ok_or("missing value")?
        .parse()
        .map_err(|_| "value is not a number")?;
    if !value.is_finite() {
        return Err("value must be finite");
    }
    Ok(value)
}

fn parse_hand(value: Option<&str>) -> Result<Option<f32>, &'static str> {
    match value {
        Some(MISSING_HAND) => Ok(None),
        value => parse_value(value).map(Some),
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            let mut controls = Controls::default();
            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout(), &mut controls)? {}
            info!("Keyboard driver finished.");
            Ok(())
        })
    }
}
