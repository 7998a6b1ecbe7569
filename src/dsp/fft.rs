//! Length-N radix-2 Cooley–Tukey FFT kernel.
//!
//! Operates in place on separate real/imaginary buffers. Bit-reversal
//! permutation tables and per-length twiddle tables are cached per thread
//! so repeated calls at the same `N` do no extra allocation beyond the
//! first.

use crate::error::Error;
use std::cell::RefCell;
use std::collections::HashMap;

struct Twiddles {
    /// `cos`/`sin` of `-2*pi*k/N` for `k` in `[0, N/2)`.
    cos: Vec<f32>,
    sin: Vec<f32>,
}

thread_local! {
    static BIT_REVERSAL: RefCell<HashMap<usize, Vec<u32>>> = RefCell::new(HashMap::new());
    static TWIDDLES: RefCell<HashMap<usize, Twiddles>> = RefCell::new(HashMap::new());
}

fn is_pow2(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

fn log2_usize(n: usize) -> u32 {
    n.trailing_zeros()
}

fn bit_reversal_table(n: usize) -> Vec<u32> {
    BIT_REVERSAL.with(|cache| {
        cache
            .borrow_mut()
            .entry(n)
            .or_insert_with(|| {
                let bits = log2_usize(n);
                (0..n as u32)
                    .map(|i| i.reverse_bits() >> (32 - bits))
                    .collect()
            })
            .clone()
    })
}

fn twiddle_table(n: usize, f: impl FnOnce(&Twiddles)) {
    TWIDDLES.with(|cache| {
        let mut cache = cache.borrow_mut();
        let table = cache.entry(n).or_insert_with(|| {
            let half = n / 2;
            let mut cos = Vec::with_capacity(half.max(1));
            let mut sin = Vec::with_capacity(half.max(1));
            for k in 0..half {
                let theta = -2.0 * std::f32::consts::PI * k as f32 / n as f32;
                cos.push(theta.cos());
                sin.push(theta.sin());
            }
            Twiddles { cos, sin }
        });
        f(table);
    });
}

/// Validates `N` against the kernel's contract: a power of two in `[2, 65536]`.
pub fn validate_size(n: usize) -> Result<(), Error> {
    if !is_pow2(n) || !(2..=65536).contains(&n) {
        return Err(Error::InvalidSize { requested: n });
    }
    Ok(())
}

/// In-place complex FFT: `fft(re[N], im[N]) -> (re', im')`.
///
/// Bit-reversal permutes, then runs iterative Cooley–Tukey with stage
/// lengths `2, 4, ..., N`. Pure: identical inputs always produce
/// identical outputs.
pub fn fft(re: &mut [f32], im: &mut [f32]) -> Result<(), Error> {
    let n = re.len();
    if im.len() != n {
        return Err(Error::Internal(format!(
            "fft buffers of mismatched length: re={} im={}",
            n,
            im.len()
        )));
    }
    validate_size(n)?;

    let rev = bit_reversal_table(n);
    for i in 0..n {
        let j = rev[i] as usize;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    twiddle_table(n, |tw| {
        let mut stage_len = 2usize;
        while stage_len <= n {
            let half = stage_len / 2;
            let stride = n / stage_len;
            let mut start = 0;
            while start < n {
                for k in 0..half {
                    let tw_idx = k * stride;
                    let (c, s) = (tw.cos[tw_idx], tw.sin[tw_idx]);
                    let a = start + k;
                    let b = a + half;
                    let br = re[b] * c - im[b] * s;
                    let bi = re[b] * s + im[b] * c;
                    re[b] = re[a] - br;
                    im[b] = im[a] - bi;
                    re[a] += br;
                    im[a] += bi;
                }
                start += stage_len;
            }
            stage_len <<= 1;
        }
    });

    Ok(())
}
