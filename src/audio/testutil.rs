//! Deterministic signal builders for tests.

use std::f64::consts::PI;

pub(crate) const SAMPLE_RATE: u32 = super::DEFAULT_SAMPLE_RATE;
pub(crate) const WINDOW_SIZE: usize = super::DEFAULT_WINDOW_SIZE;

// Amplitudes are distinct so that the loudest bins of a window are unambiguous.
const TONE_AMPLITUDES: [f64; 5] = [6000.0, 5000.0, 4000.0, 3000.0, 2000.0];

/// One window made of up to five sinusoids, each completing a whole number of cycles in the
/// window so that all of its energy lands in exactly one FFT bin.
pub(crate) fn tone_window(bins: &[usize], window_size: usize) -> Vec<i16> {
    assert!(bins.len() <= TONE_AMPLITUDES.len());
    (0..window_size)
        .map(|n| {
            let v: f64 = bins
                .iter()
                .zip(TONE_AMPLITUDES)
                .map(|(&k, a)| a * (2.0 * PI * k as f64 * n as f64 / window_size as f64).sin())
                .sum();
            v.round() as i16
        })
        .collect()
}

/// Bins used by window `j` of [sweep].
pub(crate) fn sweep_bins(j: usize) -> [usize; 5] {
    [20 + 3 * j, 60 + 5 * j, 110 + 7 * j, 170 + 11 * j, 240 + 13 * j]
}

/// `n` windows whose tone sets all differ, so every window has a unique fingerprint.
pub(crate) fn sweep(n: usize, window_size: usize) -> Vec<i16> {
    (0..n)
        .flat_map(|j| tone_window(&sweep_bins(j), window_size))
        .collect()
}

/// `n` windows of pseudo-random noise (xorshift64).
pub(crate) fn noise(n: usize, window_size: usize, seed: u64) -> Vec<i16> {
    let mut state = seed.max(1);
    (0..n * window_size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state % 16001) as i32 - 8000) as i16
        })
        .collect()
}

/// Frequency (Hz) of positive FFT bin `k`.
pub(crate) fn bin_frequency(k: usize, window_size: usize, sample_rate: u32) -> i64 {
    (k as i64 * i64::from(sample_rate)) / window_size as i64
}
