//! The [`Spectrogram`] result type shared by the full-track builder and the
//! tile manager's hi-res sessions.

use crate::token::Token;
use std::sync::Arc;

/// Immutable result of one analysis run.
///
/// Once constructed, no field mutates; replacing the "current" instance in
/// the tile manager or facade is a value swap, never in-place edit.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    data: Arc<[f32]>,
    frames: usize,
    bins: usize,
    hop_size: usize,
    fft_size: usize,
    sample_rate: u32,
    slice_start: f64,
    slice_duration: f64,
    total_duration: f64,
    token: Token,
}

impl Spectrogram {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        data: Vec<f32>,
        frames: usize,
        bins: usize,
        hop_size: usize,
        fft_size: usize,
        sample_rate: u32,
        slice_start: f64,
        slice_duration: f64,
        total_duration: f64,
        token: Token,
    ) -> Self {
        debug_assert_eq!(data.len(), frames * bins);
        Self {
            data: data.into(),
            frames,
            bins,
            hop_size,
            fft_size,
            sample_rate,
            slice_start,
            slice_duration,
            total_duration,
            token,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn slice_start(&self) -> f64 {
        self.slice_start
    }

    pub fn slice_duration(&self) -> f64 {
        self.slice_duration
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Cell value at `(frame, bin)`, already normalized to `[0,1]`.
    pub fn cell(&self, frame: usize, bin: usize) -> f32 {
        self.data[frame * self.bins + bin]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Time of frame `f`'s window start, in seconds from the start of the
    /// parent `PcmBuffer`.
    pub fn frame_time(&self, frame: usize) -> f64 {
        self.slice_start + frame as f64 * self.hop_size as f64 / self.sample_rate as f64
    }
}
