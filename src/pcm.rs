//! Immutable decoded-audio input.

use crate::error::Error;

/// Decoded PCM audio handed to the core by the external decoder.
///
/// Never mutated after construction; destroyed on new file load.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    sample_rate: u32,
    length: usize,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Builds a buffer from per-channel sample sequences.
    ///
    /// A channel-count or per-channel length mismatch is a programmer error
    /// in the decoder adapter, not a recoverable runtime condition, so it
    /// surfaces as `Error::Internal` rather than a dedicated error kind.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::Internal("sample_rate must be positive".into()));
        }
        if channels.is_empty() {
            return Err(Error::Internal("channel_count must be >= 1".into()));
        }
        let length = channels[0].len();
        if channels.iter().any(|c| c.len() != length) {
            return Err(Error::Internal(
                "all channels must have equal sample length".into(),
            ));
        }
        Ok(Self {
            sample_rate,
            length,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn total_duration(&self) -> f64 {
        self.length as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}
