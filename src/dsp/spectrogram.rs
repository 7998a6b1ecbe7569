//! Spectrogram builder: windowing → FFT → magnitude → log-normalize.
//!
//! Runs as a synchronous session bound to a cancellation [`Token`]. States
//! are, conceptually: idle -> windowing -> transforming -> normalizing ->
//! done | cancelled | failed. Cancellation is checked at frame-group
//! boundaries and after normalization; there is no materialized state enum
//! since no caller needs to observe an in-flight session, only its final
//! `Result`.

use crate::concurrency::Yielder;
use crate::dsp::fft;
use crate::dsp::window::window_frame;
use crate::error::Error;
use crate::pcm::PcmBuffer;
use crate::spectrogram::Spectrogram;
use crate::token::{Token, TokenSource};

/// Cancellation and yield checks happen every this many frames during the
/// transform pass.
const FRAME_CHECK_INTERVAL: usize = 500;
/// ...and every this many cells during normalization.
const NORMALIZE_CHECK_INTERVAL: usize = 131_072;

#[allow(clippy::too_many_arguments)]
pub fn build(
    pcm: &PcmBuffer,
    start_seconds: f64,
    duration_seconds: f64,
    hop_size: usize,
    fft_size: usize,
    min_db: f32,
    token: Token,
    tokens: &TokenSource,
    yielder: &dyn Yielder,
) -> Result<Spectrogram, Error> {
    fft::validate_size(fft_size)?;

    let total_duration = pcm.total_duration();
    let sample_rate = pcm.sample_rate();

    // 1. Clamp [start, start+duration] to [0, total_duration]; to samples.
    let clamped_start = start_seconds.clamp(0.0, total_duration);
    let clamped_end = (start_seconds + duration_seconds).clamp(clamped_start, total_duration);
    let start_sample = (clamped_start * sample_rate as f64).round() as usize;
    let end_sample = (clamped_end * sample_rate as f64).round() as usize;
    let segment_length = end_sample.saturating_sub(start_sample);

    if segment_length < fft_size {
        return Err(Error::InsufficientLength {
            have: segment_length,
            need: fft_size,
        });
    }

    // 2. frames = floor((segment_length - fft_size) / hop_size) + 1
    let frames = (segment_length - fft_size) / hop_size + 1;
    if frames < 1 {
        return Err(Error::InsufficientLength {
            have: segment_length,
            need: fft_size,
        });
    }

    let bins = fft_size / 2;
    let mut magnitudes = vec![0.0f32; frames * bins];
    let mut peak = 0.0f32;

    let mut re = vec![0.0f32; fft_size];
    let mut im = vec![0.0f32; fft_size];

    // 3/4. Windowing, FFT, magnitude, peak tracking.
    for f in 0..frames {
        if f % FRAME_CHECK_INTERVAL == 0 {
            if !tokens.is_current(token) {
                return Err(Error::Cancelled);
            }
            yielder.maybe_yield();
        }

        let frame_start = start_sample + f * hop_size;
        window_frame(pcm, frame_start, fft_size, &mut re);
        im.iter_mut().for_each(|v| *v = 0.0);

        fft::fft(&mut re, &mut im)?;

        let row = &mut magnitudes[f * bins..(f + 1) * bins];
        for b in 0..bins {
            let mag = (re[b] * re[b] + im[b] * im[b]).sqrt();
            row[b] = mag;
            if mag > peak {
                peak = mag;
            }
        }
    }

    if !tokens.is_current(token) {
        return Err(Error::Cancelled);
    }

    // 5. Normalize every cell to [0,1] via dB mapping. `peak` is floored so
    // silence (every magnitude, hence peak, exactly 0) divides to 0 instead
    // of NaN.
    let neg_min_db = -min_db;
    let safe_peak = peak.max(1e-12);
    for (i, cell) in magnitudes.iter_mut().enumerate() {
        if i % NORMALIZE_CHECK_INTERVAL == 0 {
            if !tokens.is_current(token) {
                return Err(Error::Cancelled);
            }
            yielder.maybe_yield();
        }
        let db = 20.0 * (*cell / safe_peak + 1e-12).log10();
        let normalized = (db - min_db) / neg_min_db;
        *cell = normalized.clamp(0.0, 1.0);
    }

    if !tokens.is_current(token) {
        return Err(Error::Cancelled);
    }

    Ok(Spectrogram::new(
        magnitudes,
        frames,
        bins,
        hop_size,
        fft_size,
        sample_rate,
        clamped_start,
        clamped_end - clamped_start,
        total_duration,
        token,
    ))
}

/// [`crate::tile::SpectrogramBuilder`] wrapper around [`build`], used as the
/// always-available fallback when the optional GPU backend is absent or
/// demoted.
pub struct CpuBackend;

impl crate::tile::SpectrogramBuilder for CpuBackend {
    fn build(
        &self,
        pcm: &PcmBuffer,
        start_seconds: f64,
        duration_seconds: f64,
        hop_size: usize,
        fft_size: usize,
        min_db: f32,
        token: Token,
        tokens: &TokenSource,
        yielder: &dyn Yielder,
    ) -> Result<Spectrogram, Error> {
        build(pcm, start_seconds, duration_seconds, hop_size, fft_size, min_db, token, tokens, yielder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::NoopYielder;

    fn sine_pcm(freq: f64, seconds: f64, sample_rate: u32) -> PcmBuffer {
        let n = (seconds * sample_rate as f64) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin() as f32
            })
            .collect();
        PcmBuffer::new(sample_rate, vec![samples]).unwrap()
    }

    fn silence_pcm(seconds: f64, sample_rate: u32) -> PcmBuffer {
        let n = (seconds * sample_rate as f64) as usize;
        PcmBuffer::new(sample_rate, vec![vec![0.0f32; n]]).unwrap()
    }

    #[test]
    fn cells_are_in_unit_range() {
        let pcm = sine_pcm(1000.0, 1.0, 48000);
        let tokens = TokenSource::new();
        let token = tokens.bump();
        let spec = build(&pcm, 0.0, 1.0, 480, 1024, -85.0, token, &tokens, &NoopYielder).unwrap();
        for f in 0..spec.frames() {
            for b in 0..spec.bins() {
                let v = spec.cell(f, b);
                assert!((0.0..=1.0).contains(&v), "cell ({f},{b}) = {v} out of range");
            }
        }
    }

    #[test]
    fn frame_count_matches_formula() {
        let pcm = silence_pcm(2.0, 48000);
        let tokens = TokenSource::new();
        let token = tokens.bump();
        let spec = build(&pcm, 0.0, 2.0, 960, 1024, -85.0, token, &tokens, &NoopYielder).unwrap();
        assert_eq!(spec.frames(), 100);
        assert_eq!(spec.data().len(), spec.frames() * spec.bins());
    }

    #[test]
    fn silence_normalizes_to_all_zero() {
        let pcm = silence_pcm(2.0, 48000);
        let tokens = TokenSource::new();
        let token = tokens.bump();
        let spec = build(&pcm, 0.0, 2.0, 960, 1024, -85.0, token, &tokens, &NoopYielder).unwrap();
        assert_eq!(spec.frames(), 100);
        for f in 0..spec.frames() {
            for b in 0..spec.bins() {
                assert_eq!(spec.cell(f, b), 0.0);
            }
        }
    }

    #[test]
    fn sine_dominates_its_bin() {
        let sample_rate = 48000;
        let pcm = sine_pcm(1000.0, 1.0, sample_rate);
        let tokens = TokenSource::new();
        let token = tokens.bump();
        let spec = build(&pcm, 0.0, 1.0, 480, 1024, -85.0, token, &tokens, &NoopYielder).unwrap();

        let expected_bin = (1000.0 / sample_rate as f64 * 1024.0).round() as usize;
        assert_eq!(expected_bin, 21);

        for f in 1..spec.frames() - 1 {
            assert!(
                spec.cell(f, expected_bin) > 0.9,
                "frame {f} bin {expected_bin} = {}",
                spec.cell(f, expected_bin)
            );
            let far_bin = expected_bin + 40;
            if far_bin < spec.bins() {
                assert!(
                    spec.cell(f, far_bin) < 0.2,
                    "frame {f} bin {far_bin} = {}",
                    spec.cell(f, far_bin)
                );
            }
        }
    }

    #[test]
    fn short_clip_is_insufficient_length() {
        let pcm = PcmBuffer::new(48000, vec![vec![0.0f32; 512]]).unwrap();
        let tokens = TokenSource::new();
        let token = tokens.bump();
        let err = build(&pcm, 0.0, pcm.total_duration(), 256, 1024, -85.0, token, &tokens, &NoopYielder)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientLength { .. }));
    }

    #[test]
    fn idempotent_on_identical_inputs() {
        let pcm = sine_pcm(1000.0, 0.5, 48000);
        let tokens = TokenSource::new();
        let t1 = tokens.bump();
        let t2 = tokens.bump();
        let spec1 = build(&pcm, 0.0, 0.5, 480, 1024, -85.0, t1, &tokens, &NoopYielder).unwrap();
        let spec2 = build(&pcm, 0.0, 0.5, 480, 1024, -85.0, t2, &tokens, &NoopYielder).unwrap();
        assert_eq!(spec1.data(), spec2.data());
    }

    #[test]
    fn stale_token_cancels() {
        let pcm = sine_pcm(1000.0, 0.5, 48000);
        let tokens = TokenSource::new();
        let stale = tokens.bump();
        let _current = tokens.bump();
        let err = build(&pcm, 0.0, 0.5, 480, 1024, -85.0, stale, &tokens, &NoopYielder).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
