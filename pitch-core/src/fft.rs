//! # Fast Fourier Transform (FFT) Module
//!
//! An in-place, iterative radix-2 Cooley-Tukey transform over
//! `rustfft`'s complex type, plus the helpers that prepare a block of
//! 16-bit samples for it.
//!
//! ## Features
//! - Int16 to `[-1, 1]` normalization with zero padding
//! - Bit-reversal permutation followed by log2(n) butterfly stages
//! - Magnitude extraction for a bin range

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Converts raw samples to a complex buffer of exactly `buffer_size` points.
///
/// Each sample is divided by `i16::MAX`, samples past `buffer_size` are
/// ignored and missing samples are zero-padded. Imaginary parts start at 0.
pub fn normalize_samples(samples: &[i16], buffer_size: usize) -> Vec<Complex<f64>> {
    let scale = f64::from(i16::MAX);
    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .take(buffer_size)
        .map(|&sample| Complex::new(f64::from(sample) / scale, 0.0))
        .collect();
    buffer.resize(buffer_size, Complex::new(0.0, 0.0));
    buffer
}

/// Reverses the lowest `bits` bits of `index`.
fn reverse_bits(index: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    index.reverse_bits() >> (usize::BITS - bits)
}

/// Performs a forward FFT on `buffer` in place.
///
/// Twiddle factors are `exp(-2*pi*i*k/L)` for each stage length `L`, so the
/// result matches the usual unnormalized forward DFT.
///
/// # Panics
/// * If the buffer length is not a power of two
pub fn fft_in_place(buffer: &mut [Complex<f64>]) {
    let n = buffer.len();
    if n <= 1 {
        return;
    }
    assert!(n.is_power_of_two(), "FFT length {n} is not a power of two");

    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = reverse_bits(i, bits);
        if j > i {
            buffer.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let angle = -2.0 * PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let twiddle = Complex::new((angle * k as f64).cos(), (angle * k as f64).sin());
                let even = buffer[start + k];
                let odd = buffer[start + k + half] * twiddle;
                buffer[start + k] = even + odd;
                buffer[start + k + half] = even - odd;
            }
        }
        len <<= 1;
    }
}

/// Magnitudes `sqrt(re^2 + im^2)` for bins `range.start..=range.end`.
///
/// The returned vector is indexed from `range.start`.
pub fn magnitudes(spectrum: &[Complex<f64>], range: std::ops::RangeInclusive<usize>) -> Vec<f64> {
    spectrum
        .get(range)
        .map(|bins| bins.iter().map(|c| c.norm()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn test_signal(n: usize) -> Vec<Complex<f64>> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                let re = (0.37 * t).sin()
                    + 0.5 * (1.91 * t).cos()
                    + ((i * 7919) % 13) as f64 / 13.0;
                Complex::new(re, 0.0)
            })
            .collect()
    }

    #[test]
    fn matches_rustfft() {
        for n in [2, 8, 64, 1024] {
            let signal = test_signal(n);

            let mut ours = signal.clone();
            fft_in_place(&mut ours);

            let mut reference = signal;
            FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut reference);

            for (i, (a, b)) in ours.iter().zip(reference.iter()).enumerate() {
                assert!(
                    (a - b).norm() < 1e-9 * n as f64,
                    "n={n} bin {i}: {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        let mut buffer = vec![Complex::new(0.0, 0.0); 16];
        buffer[0] = Complex::new(1.0, 0.0);
        fft_in_place(&mut buffer);
        for c in &buffer {
            assert!((c.re - 1.0).abs() < 1e-12 && c.im.abs() < 1e-12);
        }
    }

    #[test]
    fn pure_bin_sine_lands_in_one_bin() {
        let n = 256;
        let mut buffer: Vec<Complex<f64>> = (0..n)
            .map(|i| Complex::new((2.0 * PI * 8.0 * i as f64 / n as f64).sin(), 0.0))
            .collect();
        fft_in_place(&mut buffer);
        let mags = magnitudes(&buffer, 0..=n / 2);
        assert!((mags[8] - n as f64 / 2.0).abs() < 1e-9);
        assert!(mags[7] < 1e-9 && mags[9] < 1e-9);
    }

    #[test]
    fn normalization_pads_and_truncates() {
        let buffer = normalize_samples(&[i16::MAX, -i16::MAX, 0], 4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer[0].re, 1.0);
        assert_eq!(buffer[1].re, -1.0);
        assert_eq!(buffer[3], Complex::new(0.0, 0.0));

        let buffer = normalize_samples(&[1; 10], 4);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn magnitudes_out_of_range_is_empty() {
        let spectrum = vec![Complex::new(3.0, 4.0); 4];
        assert_eq!(magnitudes(&spectrum, 1..=2), vec![5.0, 5.0]);
        assert!(magnitudes(&spectrum, 2..=9).is_empty());
    }
}
