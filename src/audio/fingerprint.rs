use std::time::Duration;

use super::{SampleSource, SpectralReader};
use crate::{util, Error, Result};

/// Parameters shared by fingerprinting and searching.
///
/// A reference fingerprint and the target it is searched in must be read with the same
/// parameters for their windows to be comparable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FingerprintConfig {
    window_size: usize,
    top_k: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_size: super::DEFAULT_WINDOW_SIZE,
            top_k: super::DEFAULT_TOP_K,
        }
    }
}

impl FingerprintConfig {
    pub fn new(window_size: usize, top_k: usize) -> Self {
        Self { window_size, top_k }
    }

    /// Returns a new [FingerprintConfig] with the provided `window_size`.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Returns a new [FingerprintConfig] with the provided `top_k`.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of independent frequency bins a real FFT produces for this window size.
    pub fn num_bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidParameter(
                "window_size must be a positive number".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidParameter(
                "top_k must be a positive number".to_string(),
            ));
        }
        if self.top_k > self.num_bins() {
            return Err(Error::InvalidParameter(format!(
                "top_k ({}) exceeds the {} frequency bins of a {}-sample window",
                self.top_k,
                self.num_bins(),
                self.window_size
            )));
        }
        Ok(())
    }
}

/// The loudest frequencies (Hz) of a single window, sorted ascending.
///
/// The order carries the ranking by frequency, not by loudness.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct WindowFingerprint(Vec<i64>);

impl WindowFingerprint {
    pub fn new(mut frequencies: Vec<i64>) -> Self {
        frequencies.sort_unstable();
        Self(frequencies)
    }

    pub fn frequencies(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of absolute differences between entries at the same position, over the shorter of
    /// the two windows.
    #[inline]
    pub fn distance(&self, other: &WindowFingerprint) -> u64 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.abs_diff(*b))
            .sum()
    }
}

impl From<Vec<i64>> for WindowFingerprint {
    fn from(frequencies: Vec<i64>) -> Self {
        Self::new(frequencies)
    }
}

/// An ordered sequence of [WindowFingerprint]s, one per analysis window of a clip.
///
/// The [FingerprintConfig] it was read with travels along, so a target can be read the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    sample_rate: u32,
    config: FingerprintConfig,
    windows: Vec<WindowFingerprint>,
}

impl Fingerprint {
    pub fn new(
        sample_rate: u32,
        config: FingerprintConfig,
        windows: Vec<WindowFingerprint>,
    ) -> Self {
        Self {
            sample_rate,
            config,
            windows,
        }
    }

    pub fn windows(&self) -> &[WindowFingerprint] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Sample rate of the audio this fingerprint was built from.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size()
    }

    pub fn top_k(&self) -> usize {
        self.config.top_k()
    }

    /// Duration of audio covered by this fingerprint.
    pub fn duration(&self) -> Duration {
        self.window_offset(self.len())
    }

    /// Time at which window `index` starts.
    pub fn window_offset(&self, index: usize) -> Duration {
        util::window_offset(index, self.window_size(), self.sample_rate)
    }
}

/// Builds a [Fingerprint] from every full window of `source`.
///
/// Fails with [Error::Decode] if the source is empty or cannot be read, and with
/// [Error::InvalidParameter] if `config` is invalid.
pub fn build_fingerprint<S: SampleSource>(
    source: S,
    config: &FingerprintConfig,
) -> Result<Fingerprint> {
    let span = tracing::span!(tracing::Level::TRACE, "build_fingerprint");
    let _enter = span.enter();

    config.validate()?;
    if source.total_frames() == 0 {
        return Err(Error::Decode("audio source has no frames".to_string()));
    }

    let mut reader = SpectralReader::from_config(source, config)?;
    let sample_rate = reader.sample_rate();
    let mut windows = Vec::with_capacity(reader.num_windows());
    while reader.has_next() {
        windows.push(reader.next_window_fingerprint()?);
    }

    tracing::debug!(
        windows = windows.len(),
        sample_rate,
        window_size = config.window_size(),
        "built fingerprint"
    );

    Ok(Fingerprint::new(sample_rate, *config, windows))
}

/// Distance between two fingerprints: the sum of [WindowFingerprint::distance] over windows at
/// the same index, for the overlapping prefix of both.
///
/// The comparison is positional. An empty fingerprint is at distance `0` from anything.
pub fn distance(a: &Fingerprint, b: &Fingerprint) -> u64 {
    sequence_distance(a.windows(), b.windows())
}

pub(crate) fn sequence_distance<'a, A, B>(a: A, b: B) -> u64
where
    A: IntoIterator<Item = &'a WindowFingerprint>,
    B: IntoIterator<Item = &'a WindowFingerprint>,
{
    a.into_iter().zip(b).map(|(x, y)| x.distance(y)).sum()
}

#[cfg(test)]
mod test {
    use super::super::testutil::{self, SAMPLE_RATE, WINDOW_SIZE};
    use super::super::MemorySource;
    use super::*;

    fn fp(windows: Vec<Vec<i64>>) -> Fingerprint {
        Fingerprint::new(
            8000,
            FingerprintConfig::new(64, 3),
            windows.into_iter().map(Into::into).collect(),
        )
    }

    #[test]
    fn test_distance_is_positional() {
        let a = fp(vec![vec![1, 2, 3], vec![10, 20, 30]]);
        let b = fp(vec![vec![2, 2, 1], vec![10, 25, 30], vec![500, 500, 500]]);
        // b[0] is sorted to [1, 2, 2]; the trailing window of b has no counterpart.
        assert_eq!(distance(&a, &b), 1 + 5);
        assert_eq!(distance(&b, &a), distance(&a, &b));
    }

    #[test]
    fn test_distance_with_negative_frequencies() {
        let a = fp(vec![vec![-11025, 100]]);
        let b = fp(vec![vec![-100, 11025]]);
        assert_eq!(distance(&a, &b), 10925 + 10925);
    }

    #[test]
    fn test_distance_uses_shorter_window() {
        let a = fp(vec![vec![1, 2, 3, 4, 5]]);
        let b = fp(vec![vec![2, 3]]);
        assert_eq!(distance(&a, &b), 2);
    }

    #[test]
    fn test_distance_empty() {
        let empty = fp(vec![]);
        let other = fp(vec![vec![1, 2, 3]]);
        assert_eq!(distance(&empty, &other), 0);
        assert_eq!(distance(&other, &empty), 0);
        assert_eq!(distance(&empty, &empty), 0);
    }

    #[test]
    fn test_build_fingerprint_length() {
        let mut samples = testutil::noise(7, WINDOW_SIZE, 3);
        samples.extend(vec![0i16; WINDOW_SIZE - 1]);
        let total_frames = samples.len();
        let fingerprint = build_fingerprint(
            MemorySource::new(samples, SAMPLE_RATE),
            &FingerprintConfig::default(),
        )
        .unwrap();
        assert_eq!(fingerprint.len(), total_frames / WINDOW_SIZE);
        assert_eq!(fingerprint.sample_rate(), SAMPLE_RATE);
        assert!(fingerprint.windows().iter().all(|w| w.len() == 5));
    }

    #[test]
    fn test_build_fingerprint_sorted() {
        let samples = testutil::noise(12, WINDOW_SIZE, 99);
        let fingerprint = build_fingerprint(
            MemorySource::new(samples, SAMPLE_RATE),
            &FingerprintConfig::default().with_top_k(9),
        )
        .unwrap();
        assert_eq!(fingerprint.top_k(), 9);
        assert_eq!(fingerprint.window_size(), WINDOW_SIZE);
        for window in fingerprint.windows() {
            assert_eq!(window.len(), 9);
            assert!(window.frequencies().windows(2).all(|p| p[0] <= p[1]));
        }
    }

    #[test]
    fn test_build_fingerprint_deterministic() {
        let mut samples = testutil::sweep(4, WINDOW_SIZE);
        samples.extend(testutil::noise(4, WINDOW_SIZE, 11));
        let config = FingerprintConfig::default();

        let a = build_fingerprint(MemorySource::new(samples.clone(), SAMPLE_RATE), &config).unwrap();
        let b = build_fingerprint(MemorySource::new(samples, SAMPLE_RATE), &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(distance(&a, &b), 0);
    }

    #[test]
    fn test_build_fingerprint_of_sweep() {
        let samples = testutil::sweep(3, WINDOW_SIZE);
        let fingerprint = build_fingerprint(
            MemorySource::new(samples, SAMPLE_RATE),
            &FingerprintConfig::default(),
        )
        .unwrap();
        for (j, window) in fingerprint.windows().iter().enumerate() {
            let expected: Vec<i64> = testutil::sweep_bins(j)
                .iter()
                .map(|&k| testutil::bin_frequency(k, WINDOW_SIZE, SAMPLE_RATE))
                .collect();
            assert_eq!(window.frequencies(), expected.as_slice());
        }
        assert_eq!(
            fingerprint.duration(),
            Duration::from_secs_f64(3.0 * WINDOW_SIZE as f64 / SAMPLE_RATE as f64)
        );
    }

    #[test]
    fn test_build_fingerprint_short_source() {
        let config = FingerprintConfig::default();
        let fingerprint =
            build_fingerprint(MemorySource::new(vec![0i16; 100], SAMPLE_RATE), &config).unwrap();
        assert!(fingerprint.is_empty());

        let err = build_fingerprint(MemorySource::new(Vec::new(), SAMPLE_RATE), &config)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    struct FailingSource {
        remaining: usize,
    }

    impl SampleSource for FailingSource {
        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        // Claims more audio than it can deliver.
        fn total_frames(&self) -> usize {
            WINDOW_SIZE * 4
        }

        fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
            if buf.len() > self.remaining {
                return Err(Error::Decode("corrupt stream".to_string()));
            }
            self.remaining -= buf.len();
            buf.fill(0);
            Ok(())
        }
    }

    #[test]
    fn test_build_fingerprint_propagates_decode_error() {
        let source = FailingSource {
            remaining: WINDOW_SIZE * 2,
        };
        let err = build_fingerprint(source, &FingerprintConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_config_validation() {
        assert!(FingerprintConfig::default().validate().is_ok());
        assert!(FingerprintConfig::new(2048, 1025).validate().is_ok());
        assert!(matches!(
            FingerprintConfig::new(2048, 1026).validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            FingerprintConfig::new(2048, 0).validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            FingerprintConfig::new(0, 5).validate(),
            Err(Error::InvalidParameter(_))
        ));
    }
}
