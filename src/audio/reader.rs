use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::{FingerprintConfig, SampleSource, WindowFingerprint};
use crate::{Error, Result};

/// Maps real-FFT bin indices to signed frequencies (Hz) for a given window size and sample rate.
///
/// Bins follow the ordering of a full-length DFT: for an even window size, the last real-FFT bin
/// is the Nyquist bin and is reported as a *negative* frequency. Values are truncated towards
/// zero and are never rectified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinTable {
    frequencies: Vec<i64>,
}

impl BinTable {
    pub fn new(window_size: usize, sample_rate: u32) -> Self {
        let n = window_size as i64;
        let sample_rate = i64::from(sample_rate);
        // Number of non-negative frequencies in the full DFT ordering.
        let positive = (window_size + 1) / 2;

        let frequencies = (0..window_size / 2 + 1)
            .map(|i| {
                let k = if i < positive { i as i64 } else { i as i64 - n };
                k * sample_rate / n
            })
            .collect();

        Self { frequencies }
    }

    #[inline]
    pub fn frequency(&self, bin: usize) -> i64 {
        self.frequencies[bin]
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.frequencies
    }
}

/// Splits a [SampleSource] into non-overlapping windows and reduces each one to its loudest
/// frequencies.
///
/// The reader is forward-only and finite: it yields `total_frames / window_size` windows, and
/// any trailing partial window is dropped. Once exhausted, a new reader must be built over a
/// fresh source.
pub struct SpectralReader<S: SampleSource> {
    source: S,
    window_size: usize,
    top_k: usize,
    bins: BinTable,
    fft: Arc<dyn RealToComplex<f64>>,
    pcm: Vec<i16>,
    input: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
    ranked: Vec<usize>,
    cursor: usize,
    num_windows: usize,
}

impl<S: SampleSource> SpectralReader<S> {
    /// Builds a reader over `source`.
    ///
    /// Fails with [Error::InvalidParameter] for an unusable window size or bin count, and with
    /// [Error::Decode] if the source reports an invalid sample rate.
    pub fn new(source: S, window_size: usize, top_k: usize) -> Result<Self> {
        FingerprintConfig::new(window_size, top_k).validate()?;

        let sample_rate = source.sample_rate();
        if sample_rate == 0 {
            return Err(Error::Decode("invalid sample rate: 0 Hz".to_string()));
        }

        let fft = RealFftPlanner::<f64>::new().plan_fft_forward(window_size);
        let input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let num_windows = source.total_frames() / window_size;

        tracing::trace!(
            sample_rate,
            window_size,
            top_k,
            num_windows,
            "built spectral reader"
        );

        Ok(Self {
            bins: BinTable::new(window_size, sample_rate),
            pcm: vec![0; window_size],
            magnitudes: Vec::with_capacity(spectrum.len()),
            ranked: Vec::with_capacity(spectrum.len()),
            source,
            window_size,
            top_k,
            fft,
            input,
            spectrum,
            cursor: 0,
            num_windows,
        })
    }

    /// Builds a reader using the window size and bin count of `config`.
    pub fn from_config(source: S, config: &FingerprintConfig) -> Result<Self> {
        Self::new(source, config.window_size(), config.top_k())
    }

    /// Returns true while at least one full window remains unconsumed.
    pub fn has_next(&self) -> bool {
        self.cursor < self.num_windows
    }

    /// Total number of full windows in the underlying source.
    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    /// Number of full windows that have not been consumed yet.
    pub fn remaining(&self) -> usize {
        self.num_windows - self.cursor
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn bins(&self) -> &BinTable {
        &self.bins
    }

    /// Consumes the next window and returns its fingerprint.
    ///
    /// The `top_k` bins with the largest FFT magnitude are selected (ties go to the lower bin
    /// index), mapped through the [BinTable], and returned sorted by frequency.
    pub fn next_window_fingerprint(&mut self) -> Result<WindowFingerprint> {
        if !self.has_next() {
            return Err(Error::Decode(format!(
                "no full window left after {} windows",
                self.num_windows
            )));
        }

        self.source.read_exact(&mut self.pcm)?;
        self.cursor += 1;

        for (x, s) in self.input.iter_mut().zip(&self.pcm) {
            *x = f64::from(*s);
        }
        self.fft.process(&mut self.input, &mut self.spectrum)?;

        self.magnitudes.clear();
        self.magnitudes.extend(self.spectrum.iter().map(|c| c.norm()));

        self.ranked.clear();
        self.ranked.extend(0..self.magnitudes.len());
        let magnitudes = &self.magnitudes;
        let by_loudness =
            |a: &usize, b: &usize| magnitudes[*b].total_cmp(&magnitudes[*a]).then(a.cmp(b));
        if self.top_k < self.ranked.len() {
            self.ranked.select_nth_unstable_by(self.top_k - 1, by_loudness);
            self.ranked.truncate(self.top_k);
        }

        let frequencies = self
            .ranked
            .iter()
            .map(|&bin| self.bins.frequency(bin))
            .collect();

        Ok(WindowFingerprint::new(frequencies))
    }

    /// Releases the reader and returns the underlying source.
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: SampleSource> Iterator for SpectralReader<S> {
    type Item = Result<WindowFingerprint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_next() {
            Some(self.next_window_fingerprint())
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

#[cfg(test)]
mod test {
    use super::super::testutil::{self, SAMPLE_RATE, WINDOW_SIZE};
    use super::super::MemorySource;
    use super::*;

    #[test]
    fn test_bin_table_even_window() {
        let table = BinTable::new(8, 8000);
        insta::assert_debug_snapshot!(table.as_slice(), @r###"
        [
            0,
            1000,
            2000,
            3000,
            -4000,
        ]
        "###);
    }

    #[test]
    fn test_bin_table_odd_window() {
        // No Nyquist bin for odd sizes, so every real-FFT bin is non-negative.
        let table = BinTable::new(7, 7000);
        assert_eq!(table.as_slice(), &[0, 1000, 2000, 3000]);
    }

    #[test]
    fn test_bin_table_truncates() {
        let table = BinTable::new(WINDOW_SIZE, SAMPLE_RATE);
        assert_eq!(table.len(), WINDOW_SIZE / 2 + 1);
        // 20 * 22050 / 2048 = 215.33
        assert_eq!(table.frequency(20), 215);
        assert_eq!(table.frequency(WINDOW_SIZE / 2), -11025);
    }

    #[test]
    fn test_window_fingerprint_of_tones() {
        let bins = [300, 40, 170, 95, 12];
        let source = MemorySource::new(testutil::tone_window(&bins, WINDOW_SIZE), SAMPLE_RATE);
        let mut reader = SpectralReader::new(source, WINDOW_SIZE, 5).unwrap();
        assert!(reader.has_next());

        let window = reader.next_window_fingerprint().unwrap();
        let mut expected: Vec<i64> = bins
            .iter()
            .map(|&k| testutil::bin_frequency(k, WINDOW_SIZE, SAMPLE_RATE))
            .collect();
        expected.sort_unstable();
        assert_eq!(window.frequencies(), expected.as_slice());
        assert!(!reader.has_next());
    }

    #[test]
    fn test_top_k_keeps_loudest_bins() {
        // Amplitudes decrease in argument order, so asking for 2 keeps bins 300 and 40.
        let source = MemorySource::new(
            testutil::tone_window(&[300, 40, 170, 95, 12], WINDOW_SIZE),
            SAMPLE_RATE,
        );
        let mut reader = SpectralReader::new(source, WINDOW_SIZE, 2).unwrap();
        let window = reader.next_window_fingerprint().unwrap();
        assert_eq!(
            window.frequencies(),
            &[
                testutil::bin_frequency(40, WINDOW_SIZE, SAMPLE_RATE),
                testutil::bin_frequency(300, WINDOW_SIZE, SAMPLE_RATE),
            ]
        );
    }

    #[test]
    fn test_ties_go_to_lowest_bins() {
        // Silence: every bin has zero magnitude.
        let source = MemorySource::new(vec![0i16; 16], 16);
        let mut reader = SpectralReader::new(source, 16, 3).unwrap();
        let window = reader.next_window_fingerprint().unwrap();
        assert_eq!(window.frequencies(), &[0, 1, 2]);
    }

    #[test]
    fn test_window_count_drops_partial_window() {
        let source = MemorySource::new(vec![0i16; 3 * 64 + 63], 8000);
        let reader = SpectralReader::new(source, 64, 5).unwrap();
        assert_eq!(reader.num_windows(), 3);
        let windows: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(windows.len(), 3);
    }

    #[test]
    fn test_exhausted_reader_fails() {
        let source = MemorySource::new(vec![0i16; 64], 8000);
        let mut reader = SpectralReader::new(source, 64, 5).unwrap();
        reader.next_window_fingerprint().unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(matches!(
            reader.next_window_fingerprint(),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        let source = || MemorySource::new(vec![0i16; 64], 8000);
        assert!(matches!(
            SpectralReader::new(source(), 0, 5),
            Err(Error::InvalidParameter(_))
        ));
        // A 64-sample window only has 33 independent bins.
        assert!(matches!(
            SpectralReader::new(source(), 64, 34),
            Err(Error::InvalidParameter(_))
        ));
        assert!(SpectralReader::new(source(), 64, 33).is_ok());
        assert!(matches!(
            SpectralReader::new(MemorySource::new(vec![0i16; 64], 0), 64, 5),
            Err(Error::Decode(_))
        ));
    }
}
