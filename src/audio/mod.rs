#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod fingerprint;
mod matcher;
mod reader;
mod searcher;
mod source;
#[cfg(test)]
pub(crate) mod testutil;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use fingerprint::{
    build_fingerprint, distance, Fingerprint, FingerprintConfig, WindowFingerprint,
};
pub use matcher::{find_best_alignment, MatchResult};
pub use reader::{BinTable, SpectralReader};
pub use searcher::{SearchResult, Searcher};
pub use source::{open_file, MemorySource, SampleSource, Segment, WavSource};

/// Default analysis window size, in samples.
///
/// Windows do not overlap: each one advances the stream by exactly this many samples. At the
/// default sample rate this is ~93 ms of audio per window.
pub const DEFAULT_WINDOW_SIZE: usize = 2048;

/// Default number of loudest frequency bins kept per window.
pub const DEFAULT_TOP_K: usize = 5;

/// Default sample rate (Hz) that decoded media is resampled to.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Default search percentage.
///
/// Only the first percentage of each target is searched for the intro.
pub const DEFAULT_SEARCH_PERCENTAGE: f32 = 0.50;

/// Default intro time padding (seconds).
///
/// This amount is added to the start time and subtracted from the end time of each match.
pub const DEFAULT_TIME_PADDING: f32 = 0.0;

static MATCH_FILE_EXT: &str = "introseek.json";
