//! Downmixing and Hann windowing.

use crate::pcm::PcmBuffer;
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static HANN_CACHE: RefCell<HashMap<usize, Vec<f32>>> = RefCell::new(HashMap::new());
}

/// `w[i] = 0.5 * (1 - cos(2*pi*i/(N-1)))`, cached per size.
pub fn hann_window(size: usize) -> Vec<f32> {
    HANN_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(size)
            .or_insert_with(|| {
                if size == 1 {
                    return vec![1.0];
                }
                (0..size)
                    .map(|i| {
                        0.5 * (1.0
                            - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
                    })
                    .collect()
            })
            .clone()
    })
}

/// Fills `out` (length `fft_size`) with the downmixed, Hann-windowed frame
/// starting at `start_sample` in `pcm`. Samples past the end of the buffer
/// contribute zero (tail zero-padding only).
pub fn window_frame(pcm: &PcmBuffer, start_sample: usize, fft_size: usize, out: &mut [f32]) {
    debug_assert_eq!(out.len(), fft_size);
    let window = hann_window(fft_size);
    let channels = pcm.channels();
    let inv_channel_count = 1.0 / channels.len() as f32;
    let length = pcm.length();

    for i in 0..fft_size {
        let sample_idx = start_sample + i;
        let mixed = if sample_idx < length {
            let mut sum = 0.0f32;
            for channel in channels {
                sum += channel[sample_idx];
            }
            sum * inv_channel_count
        } else {
            0.0
        };
        out[i] = mixed * window[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_endpoints_are_zero() {
        let w = hann_window(8);
        assert!(w[0].abs() < 1e-6);
        assert!(w[7].abs() < 1e-6);
    }

    #[test]
    fn downmix_averages_channels() {
        let pcm = PcmBuffer::new(1000, vec![vec![1.0; 4], vec![3.0; 4]]).unwrap();
        let mut out = vec![0.0f32; 4];
        window_frame(&pcm, 0, 4, &mut out);
        let w = hann_window(4);
        for i in 0..4 {
            assert!((out[i] - 2.0 * w[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn tail_past_buffer_end_is_zero_padded() {
        let pcm = PcmBuffer::new(1000, vec![vec![1.0; 4]]).unwrap();
        let mut out = vec![0.0f32; 8];
        window_frame(&pcm, 2, 8, &mut out);
        let w = hann_window(8);
        for i in 0..2 {
            assert!((out[i] - w[i]).abs() < 1e-6);
        }
        for i in 2..8 {
            assert!(out[i].abs() < 1e-6, "index {i} should be zero-padded");
        }
    }
}
