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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use thread_priority::ThreadPriorityValue;
use tracing::{debug, error, info, span, warn, Level};

use crate::audio::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use crate::audio::{
    Device as AudioDevice, DeviceError, OutputStream, RenderStatus, Renderer,
};
use crate::config;

/// The device name that selects the host's default output device.
const DEFAULT_DEVICE: &str = "default";

/// Messages that wake the output thread so it can drop the cpal stream.
#[derive(Debug)]
enum StreamMessage {
    /// The renderer asked to stop, or the device went away.
    Halted,
    /// The stream handle was dropped.
    Close,
}

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Frames rendered per call into the renderer.
    block_frames: usize,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// State owned by the cpal data callback.
struct Callback {
    renderer: Box<dyn Renderer>,
    /// Mono scratch block, allocated once when the stream opens.
    scratch: Vec<f32>,
    channels: usize,
    halted: Arc<AtomicBool>,
    control_tx: Sender<StreamMessage>,
    priority: ThreadPriorityValue,
    rt_audio: bool,
    priority_set: bool,
}

impl Callback {
    /// Renders mono blocks and copies each sample to every device channel.
    fn fill<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        configure_audio_thread_priority(self.priority, self.rt_audio, &mut self.priority_set);

        let channels = self.channels.max(1);
        for chunk in data.chunks_mut(self.scratch.len() * channels) {
            let frames = chunk.len() / channels;
            let block = &mut self.scratch[..frames];

            if self.halted.load(Ordering::Acquire) {
                block.fill(0.0);
            } else if self.renderer.render(block) == RenderStatus::Halt {
                self.halted.store(true, Ordering::Release);
                let _ = self.control_tx.try_send(StreamMessage::Halted);
            }

            for (frame, &sample) in chunk.chunks_mut(channels).zip(block.iter()) {
                frame.fill(T::from_sample(sample));
            }
        }
    }
}

/// An open cpal stream. The cpal stream itself lives on the output thread because it
/// isn't Send on every host.
struct Stream {
    control_tx: Sender<StreamMessage>,
    halted: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl OutputStream for Stream {
    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // The output thread may already be gone if the renderer halted.
        let _ = self.control_tx.try_send(StreamMessage::Close);
        if let Some(thread) = self.output_thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: Callback,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let halted = callback.halted.clone();
    let control_tx = callback.control_tx.clone();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| callback.fill(data),
            move |err| {
                error!("CPAL output stream error: {}", err);
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    halted.store(true, Ordering::Release);
                    let _ = control_tx.try_send(StreamMessage::Halted);
                }
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    callback: Callback,
) -> Result<cpal::Stream, DeviceError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, callback),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, callback),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, config, callback),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, config, callback),
        other => Err(DeviceError::Stream(format!(
            "unsupported device sample format {:?}",
            other
        ))),
    }
}

/// Owns the cpal stream until the renderer halts or the handle is dropped.
fn run_output_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    callback: Callback,
    ready_tx: Sender<Result<(), DeviceError>>,
    control_rx: Receiver<StreamMessage>,
) {
    let span = span!(Level::INFO, "output stream (cpal)");
    let _enter = span.enter();

    let stream = match build_stream(&device, &config, sample_format, callback) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(DeviceError::Stream(e.to_string())));
        return;
    }
    if ready_tx.send(Ok(())).is_err() {
        return;
    }
    info!(
        channels = config.channels,
        sample_format = format!("{:?}", sample_format),
        "CPAL output stream started successfully"
    );

    let message = control_rx.recv();
    debug!(message = format!("{:?}", message), "Closing CPAL output stream");
    drop(stream);
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices(config::DEFAULT_BLOCK_FRAMES)?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices(block_frames: usize) -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Some(device) = Device::from_cpal(host_id, device, block_frames) {
                    devices.push(device);
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Wraps a cpal device if it has any output channels.
    fn from_cpal(host_id: cpal::HostId, device: cpal::Device, block_frames: usize) -> Option<Device> {
        let max_channels = device
            .supported_output_configs()
            .ok()?
            .map(|output_config| output_config.channels())
            .max()
            .unwrap_or(0);
        if max_channels == 0 {
            return None;
        }

        Some(Device {
            name: device.name().ok()?,
            max_channels,
            host_id,
            device,
            block_frames: block_frames.max(1),
        })
    }

    /// Gets the cpal device for the given configuration.
    pub fn get(config: &config::Audio) -> Result<Device, DeviceError> {
        let name = config.device();
        if name == DEFAULT_DEVICE {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| DeviceError::NotFound(name.to_string()))?;
            return Device::from_cpal(host.id(), device, config.block_frames())
                .ok_or_else(|| DeviceError::Unavailable(format!("{} has no outputs", name)));
        }

        Device::list_cpal_devices(config.block_frames())
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }
}

impl AudioDevice for Device {
    fn open(
        &self,
        sample_rate: u32,
        renderer: Box<dyn Renderer>,
    ) -> Result<Box<dyn OutputStream>, DeviceError> {
        let default_config = self
            .device
            .default_output_config()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let sample_format = default_config.sample_format();
        let channels = default_config.channels();
        if channels == 0 {
            return Err(DeviceError::Unavailable(format!(
                "{} reports no output channels",
                self.name
            )));
        }

        let config = cpal::StreamConfig {
            channels,
            sample_rate: sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let (control_tx, control_rx) = crossbeam_channel::bounded(2);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let halted = Arc::new(AtomicBool::new(false));
        let callback = Callback {
            renderer,
            scratch: vec![0.0; self.block_frames],
            channels: channels as usize,
            halted: halted.clone(),
            control_tx: control_tx.clone(),
            priority: callback_thread_priority(),
            rt_audio: rt_audio_enabled(),
            priority_set: false,
        };

        info!(
            device = self.name,
            sample_rate,
            channels,
            "Opening output stream."
        );

        let device = self.device.clone();
        let output_thread = thread::spawn(move || {
            run_output_thread(
                device,
                config,
                sample_format,
                callback,
                ready_tx,
                control_rx,
            )
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(Stream {
                control_tx,
                halted,
                output_thread: Some(output_thread),
            })),
            Ok(Err(e)) => {
                warn!(device = self.name, err = e.to_string(), "Unable to open output stream");
                let _ = output_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = output_thread.join();
                Err(DeviceError::Thread(
                    "output thread exited before starting the stream".to_string(),
                ))
            }
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Writes an increasing ramp and halts after a fixed number of frames.
    struct RampRenderer {
        next: f32,
        frames_left: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Renderer for RampRenderer {
        fn render(&mut self, output: &mut [f32]) -> RenderStatus {
            self.calls.fetch_add(1, Ordering::Relaxed);
            for sample in output.iter_mut() {
                *sample = self.next;
                self.next += 1.0;
            }
            self.frames_left = self.frames_left.saturating_sub(output.len());
            if self.frames_left == 0 {
                RenderStatus::Halt
            } else {
                RenderStatus::Continue
            }
        }
    }

    fn callback(
        frames_left: usize,
        scratch_frames: usize,
        channels: usize,
    ) -> (Callback, Arc<AtomicUsize>, Receiver<StreamMessage>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let (control_tx, control_rx) = crossbeam_channel::bounded(2);
        let callback = Callback {
            renderer: Box::new(RampRenderer {
                next: 0.0,
                frames_left,
                calls: calls.clone(),
            }),
            scratch: vec![0.0; scratch_frames],
            channels,
            halted: Arc::new(AtomicBool::new(false)),
            control_tx,
            priority: callback_thread_priority(),
            rt_audio: false,
            // Don't touch the test thread's scheduling.
            priority_set: true,
        };
        (callback, calls, control_rx)
    }

    #[test]
    fn test_fill_fans_mono_out_to_all_channels() {
        let (mut callback, _, _) = callback(100, 8, 2);
        let mut data = vec![0.0f32; 8];

        callback.fill(&mut data);
        assert_eq!(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0], data);
    }

    #[test]
    fn test_fill_splits_large_buffers_into_scratch_blocks() {
        let (mut callback, calls, _) = callback(100, 4, 1);
        let mut data = vec![0.0f32; 10];

        callback.fill(&mut data);
        assert_eq!(3, calls.load(Ordering::Relaxed));
        assert_eq!(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            data
        );
    }

    #[test]
    fn test_fill_halts_and_notifies() {
        let (mut callback, calls, control_rx) = callback(4, 4, 1);
        let mut data = vec![0.0f32; 8];

        callback.fill(&mut data);
        assert_eq!(vec![0.0, 1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0], data);
        assert_eq!(1, calls.load(Ordering::Relaxed));
        assert!(callback.halted.load(Ordering::Acquire));
        assert!(matches!(control_rx.try_recv(), Ok(StreamMessage::Halted)));

        // Later callbacks stay silent and don't call the renderer again.
        callback.fill(&mut data);
        assert_eq!(vec![0.0; 8], data);
        assert_eq!(1, calls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_fill_converts_to_integer_samples() {
        let (mut callback, _, _) = callback(100, 4, 1);
        let mut data = vec![0i16; 2];

        callback.fill(&mut data);
        assert_eq!(0, data[0]);
        assert_eq!(i16::MAX, data[1]);
    }
}
