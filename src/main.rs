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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gestureplay::audio::{self, SampleBuffer};
use gestureplay::config::{self, Player};
use gestureplay::controller::{keyboard, Controller};
use gestureplay::engine::PlaybackEngine;
use gestureplay::util::{duration_minutes_seconds, filename_display};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A gesture controlled variable-speed player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Decodes a song and prints what was found.
    Info {
        /// The path to the song.
        path: PathBuf,
    },
    /// Plays a song, taking commands from the keyboard until it ends or you quit.
    Play {
        /// The path to the song.
        path: PathBuf,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config.
        #[arg(short, long)]
        device: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Info { path } => {
            let buffer = SampleBuffer::load(&path)?;
            println!("{}:", filename_display(&path));
            println!("- sample rate: {} Hz", buffer.sample_rate());
            println!("- samples: {}", buffer.len());
            println!("- duration: {}", duration_minutes_seconds(buffer.duration()));
        }
        Commands::Play {
            path,
            config,
            device,
        } => {
            let player = match config {
                Some(config) => Player::deserialize(&config)?,
                None => Player::default(),
            };
            let audio_config = match device {
                Some(device) => config::Audio::new(&device),
                None => player.audio(),
            };
            let progress_interval = player.controller().progress_interval()?;

            let device = audio::get_device(&audio_config)?;
            info!(device = device.to_string(), "Using audio device.");
            let engine = Arc::new(PlaybackEngine::new(device));

            // The keyboard driver blocks on stdin, so don't wait on it at shutdown.
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(async {
                let mut controller = Controller::new(
                    engine,
                    Arc::new(keyboard::Driver::new()),
                    player.calibration(),
                    progress_interval,
                    Some(path),
                );
                controller.join().await
            });
            runtime.shutdown_background();
            result?;
        }
    }

    Ok(())
}
