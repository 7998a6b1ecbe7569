//! Pure pixel-buffer renderer.

use crate::render::colormap::Lut;
use crate::spectrogram::Spectrogram;
use crate::view::View;

/// Renders `spectrogram` (or clears the buffer if `None`) into `pixel_buffer`
/// sized `w_dev * h_dev * 4` bytes (RGBA8, row-major, top row first).
///
/// Pure given `(spectrogram, view, w_dev, h_dev)`; performs no allocation
/// beyond the caller-supplied output buffer. Sampling is nearest-neighbor
/// on both axes.
pub fn render(
    spectrogram: Option<&Spectrogram>,
    view: &View,
    w_dev: u32,
    h_dev: u32,
    dpr: f64,
    lut: &Lut,
    pixel_buffer: &mut [u8],
) {
    let expected_len = (w_dev as usize) * (h_dev as usize) * 4;
    debug_assert_eq!(pixel_buffer.len(), expected_len);

    let Some(spectrogram) = spectrogram else {
        pixel_buffer.fill(0);
        return;
    };

    if w_dev == 0 || h_dev == 0 {
        return;
    }

    let sample_rate = spectrogram.sample_rate();
    let pps_dev = view.pixels_per_second(sample_rate) * dpr;
    let time_per_frame = spectrogram.hop_size() as f64 / sample_rate as f64;
    let frames = spectrogram.frames();
    let bins = spectrogram.bins();

    let draw_width = ((view.view_duration * pps_dev).round() as u32).min(w_dev);

    for x in 0..w_dev {
        let row_is_drawn = x < draw_width;
        let frame = if row_is_drawn {
            let t = view.view_start + x as f64 / pps_dev;
            let raw = ((t - spectrogram.slice_start()) / time_per_frame).round();
            let clamped = raw.clamp(0.0, (frames - 1) as f64);
            clamped as usize
        } else {
            0
        };

        for y in 0..h_dev {
            let idx = ((y as usize) * (w_dev as usize) + x as usize) * 4;
            if !row_is_drawn {
                pixel_buffer[idx..idx + 4].copy_from_slice(&[0, 0, 0, 0]);
                continue;
            }

            let bin = if h_dev > 1 {
                let raw = ((y as f64 * (bins - 1) as f64) / (h_dev as f64 - 1.0)).round() as usize;
                bins - 1 - raw.min(bins - 1)
            } else {
                bins - 1
            };

            let value = spectrogram.cell(frame, bin);
            let [r, g, b] = lut.sample(value);
            pixel_buffer[idx] = r;
            pixel_buffer[idx + 1] = g;
            pixel_buffer[idx + 2] = b;
            pixel_buffer[idx + 3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_LUT_STOPS;
    use crate::dsp::spectrogram::build;
    use crate::concurrency::NoopYielder;
    use crate::pcm::PcmBuffer;
    use crate::token::TokenSource;

    fn sample_spectrogram() -> Spectrogram {
        let sample_rate = 48000;
        let n = sample_rate as usize * 2;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * 1000.0 * t).sin() as f32
            })
            .collect();
        let pcm = PcmBuffer::new(sample_rate, vec![samples]).unwrap();
        let tokens = TokenSource::new();
        let token = tokens.bump();
        build(&pcm, 0.0, 2.0, 480, 1024, -85.0, token, &tokens, &NoopYielder).unwrap()
    }

    #[test]
    fn clears_buffer_when_no_spectrogram() {
        let view = View {
            view_start: 0.0,
            view_duration: 1.0,
            samples_per_pixel: 2048.0,
        };
        let lut = Lut::build(&DEFAULT_LUT_STOPS);
        let mut buf = vec![0xFFu8; 4 * 4 * 4];
        render(None, &view, 4, 4, 1.0, &lut, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn columns_beyond_draw_width_are_cleared() {
        let spec = sample_spectrogram();
        let lut = Lut::build(&DEFAULT_LUT_STOPS);
        let view = View {
            view_start: 0.0,
            view_duration: 0.001,
            samples_per_pixel: 2048.0,
        };
        let w = 64u32;
        let h = 8u32;
        let mut buf = vec![0u8; (w * h * 4) as usize];
        render(Some(&spec), &view, w, h, 1.0, &lut, &mut buf);
        let last_col_idx = ((w - 1) as usize) * 4;
        assert_eq!(buf[last_col_idx + 3], 0, "last column should be cleared (alpha 0)");
    }

    #[test]
    fn in_range_pixels_are_opaque() {
        let spec = sample_spectrogram();
        let lut = Lut::build(&DEFAULT_LUT_STOPS);
        let view = View {
            view_start: 0.0,
            view_duration: 2.0,
            samples_per_pixel: 2048.0,
        };
        let w = 32u32;
        let h = 8u32;
        let mut buf = vec![0u8; (w * h * 4) as usize];
        render(Some(&spec), &view, w, h, 1.0, &lut, &mut buf);
        assert_eq!(buf[3], 255);
    }
}
