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

//! Loading of audio files into flat mono sample buffers.
//!
//! The whole file is decoded up front so the render callback only ever indexes memory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

/// Error types for loading a sample buffer.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio file error: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("Unsupported audio file: {0}")]
    Unsupported(String),
}

/// An immutable mono sample sequence at its native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from already decoded mono samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            samples,
            sample_rate,
        }
    }

    /// Decodes the given file and downmixes it to mono by averaging each frame's channels.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SampleBuffer, LoadError> {
        let path = path.as_ref();
        info!(path = ?path, "Loading song into memory");

        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Unsupported(format!("'{}': {}", path.display(), e)))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LoadError::Unsupported("No audio track found".to_string()))?;
        let track_id = track.id;
        let sample_rate = match track.codec_params.sample_rate {
            Some(0) | None => {
                return Err(LoadError::Unsupported(
                    "Sample rate not specified".to_string(),
                ))
            }
            Some(sample_rate) => sample_rate,
        };

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Unsupported(format!("'{}': {}", path.display(), e)))?;

        let mut samples = Vec::new();
        if let Some(n_frames) = track.codec_params.n_frames {
            samples.reserve(n_frames as usize);
        }

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                // Some readers report a decode error instead of EOF at the end of the stream.
                Err(SymphoniaError::DecodeError(e)) if !samples.is_empty() => {
                    warn!(
                        path = ?path,
                        err = e,
                        samples = samples.len(),
                        "Stopped reading at undecodable data, song may be truncated"
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => downmix_buffer(decoded, &mut samples),
                Err(SymphoniaError::DecodeError(e)) => {
                    // A single corrupt packet shouldn't abort the whole song.
                    warn!(path = ?path, err = e, "Skipping undecodable packet");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let buffer = SampleBuffer::new(samples, sample_rate);
        info!(
            path = ?path,
            sample_rate,
            samples = buffer.len(),
            duration = format!("{:.2}s", buffer.duration_secs()),
            "Song loaded"
        );
        Ok(buffer)
    }

    /// Returns the mono samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the native sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the duration in seconds, `len / sample_rate`.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }
}

/// Appends the decoded buffer to `output` as mono samples.
fn downmix_buffer(decoded: AudioBufferRef, output: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => downmix_planes(&buf, output, |sample| sample),
        AudioBufferRef::F64(buf) => downmix_planes(&buf, output, |sample| sample as f32),
        AudioBufferRef::S8(buf) => downmix_planes(&buf, output, scale_s8),
        AudioBufferRef::S16(buf) => downmix_planes(&buf, output, scale_s16),
        AudioBufferRef::S24(buf) => {
            downmix_planes(&buf, output, |sample| scale_s24(sample.inner()))
        }
        AudioBufferRef::S32(buf) => downmix_planes(&buf, output, scale_s32),
        AudioBufferRef::U8(buf) => downmix_planes(&buf, output, scale_u8),
        AudioBufferRef::U16(buf) => downmix_planes(&buf, output, scale_u16),
        AudioBufferRef::U24(buf) => {
            downmix_planes(&buf, output, |sample| scale_u24(sample.inner()))
        }
        AudioBufferRef::U32(buf) => downmix_planes(&buf, output, scale_u32),
    }
}

/// Averages the planes of a generic AudioBuffer frame by frame.
fn downmix_planes<T, F>(buf: &AudioBuffer<T>, output: &mut Vec<f32>, convert: F)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let frames = buf.frames();
    let planes = buf.planes();
    let planes = planes.planes();
    if planes.is_empty() {
        debug!(frames, "Decoded buffer has no channels");
        return;
    }

    let channels = planes.len() as f32;
    output.reserve(frames);
    for frame_idx in 0..frames {
        let sum: f32 = planes.iter().map(|plane| convert(plane[frame_idx])).sum();
        output.push(sum / channels);
    }
}

#[inline]
pub(crate) fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
pub(crate) fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
pub(crate) fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
pub(crate) fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
pub(crate) fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}
