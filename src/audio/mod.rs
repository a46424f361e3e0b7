//! Decoded audio buffers and the WAV codec
//!
//! Backends hand back RIFF/WAVE bytes; everything downstream of the
//! orchestrator works with [`SampleBuffer`].

mod wav;

use std::time::Duration;

pub use wav::{DecodeError, DecodedAudio, MIN_HEADER_LEN, decode, decode_wav, encode_wav};

use crate::{Error, Result};

/// Playback-ready audio: interleaved samples normalized to [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl SampleBuffer {
    /// Create a buffer from interleaved samples
    ///
    /// # Errors
    ///
    /// Returns error if the channel count is not 1 or 2, the sample rate is
    /// zero, or the sample count is not a whole number of frames
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            return Err(Error::Audio(format!("unsupported channel count: {channels}")));
        }
        if sample_rate == 0 {
            return Err(Error::Audio("sample rate must be positive".to_string()));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(Error::Audio(format!(
                "{} samples do not fill {channels}-channel frames",
                samples.len()
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
            samples,
        })
    }

    /// Number of interleaved channels (1 or 2)
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the buffer, returning its samples
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}
