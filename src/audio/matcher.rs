use std::collections::VecDeque;

use super::fingerprint::sequence_distance;
use super::{Fingerprint, FingerprintConfig, SampleSource, SpectralReader, WindowFingerprint};
use crate::{Error, Result};

/// Best alignment of a reference [Fingerprint] inside a target. This is output by
/// [find_best_alignment].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Index of the target window at which the reference starts.
    pub index: usize,
    /// Distance at that alignment. Lower is better; the scale is not normalized.
    pub score: u64,
}

/// Slides `reference` over every window alignment of `target` and returns the one with the
/// lowest [distance](super::distance).
///
/// Every alignment is scored in full, so the result is the global minimum. On ties, the
/// earliest alignment wins.
///
/// This runs in O(W * L * K) time, where W is the number of target windows, L is the reference
/// length and K is the number of bins per window.
pub fn find_best_alignment<S: SampleSource>(
    reference: &Fingerprint,
    target: S,
    config: &FingerprintConfig,
) -> Result<MatchResult> {
    let span = tracing::span!(tracing::Level::TRACE, "find_best_alignment");
    let _enter = span.enter();

    let needed = reference.len();
    if needed == 0 {
        return Err(Error::InvalidParameter(
            "reference fingerprint is empty".to_string(),
        ));
    }

    let mut reader = SpectralReader::from_config(target, config)?;
    if reader.sample_rate() != reference.sample_rate() || config != reference.config() {
        tracing::warn!(
            reference_sample_rate = reference.sample_rate(),
            reference_window_size = reference.window_size(),
            reference_top_k = reference.top_k(),
            target_sample_rate = reader.sample_rate(),
            target_window_size = config.window_size(),
            target_top_k = config.top_k(),
            "reference and target were analyzed with different parameters"
        );
    }

    let available = reader.num_windows();
    if available < needed {
        return Err(Error::InsufficientData { needed, available });
    }

    // Holds the target windows of the alignment being scored.
    let mut buffer: VecDeque<WindowFingerprint> = VecDeque::with_capacity(needed);
    for _ in 0..needed {
        buffer.push_back(reader.next_window_fingerprint()?);
    }

    let mut best = MatchResult {
        index: 0,
        score: sequence_distance(reference.windows(), &buffer),
    };

    let mut index = 0;
    while reader.has_next() {
        buffer.pop_front();
        buffer.push_back(reader.next_window_fingerprint()?);
        index += 1;

        let score = sequence_distance(reference.windows(), &buffer);
        if score < best.score {
            best = MatchResult { index, score };
        }
    }

    tracing::debug!(
        index = best.index,
        score = best.score,
        alignments = index + 1,
        "finished sliding window search"
    );

    Ok(best)
}
