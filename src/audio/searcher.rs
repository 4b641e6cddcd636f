#[cfg(feature = "rayon")]
extern crate rayon;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{find_best_alignment, Fingerprint, FingerprintConfig, SampleSource, Segment};
use crate::util;
use crate::{Error, Result};

#[derive(serde::Deserialize, serde::Serialize)]
struct MatchFile {
    pub intro: (f32, f32),
    pub index: usize,
    pub score: u64,
    /// MD5 of the target header.
    pub md5: String,
    /// Identifies the reference and search parameters that produced this result.
    pub search_md5: String,
}

impl MatchFile {
    fn search_result(&self) -> Option<SearchResult> {
        Some(SearchResult {
            index: self.index,
            score: self.score,
            start: Duration::try_from_secs_f32(self.intro.0).ok()?,
            end: Duration::try_from_secs_f32(self.intro.1).ok()?,
        })
    }
}

/// Represents the match found in a single target file. This is output by [Searcher::run].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Index of the target window at which the intro starts.
    pub index: usize,
    /// Distance between the intro and the target at `index`.
    pub score: u64,
    /// Start time of the intro in the target, after padding.
    pub start: Duration,
    /// End time of the intro in the target, after padding.
    pub end: Duration,
}

/// Searches one or more target files for a reference intro [Fingerprint].
///
/// Only the first `search_percentage` of each target is searched. Targets are independent, so
/// they can be searched in parallel.
#[derive(Debug)]
pub struct Searcher<P: AsRef<Path>> {
    reference: Fingerprint,
    targets: Vec<P>,
    config: FingerprintConfig,
    search_percentage: f32,
    time_padding: Duration,
}

impl<P: AsRef<Path> + Ord> Searcher<P> {
    /// Constructs a [Searcher] for `reference` from a list of target paths.
    pub fn from_files(reference: Fingerprint, targets: impl Into<Vec<P>>) -> Self {
        let mut targets = targets.into();
        targets.sort();
        let config = *reference.config();
        Self {
            reference,
            targets,
            config,
            search_percentage: super::DEFAULT_SEARCH_PERCENTAGE,
            time_padding: Duration::ZERO,
        }
    }

    /// Returns the target paths used by this searcher.
    pub fn targets(&self) -> &[P] {
        &self.targets
    }

    pub fn reference(&self) -> &Fingerprint {
        &self.reference
    }

    /// Returns the parameters targets are read with.
    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Returns a new [Searcher] with the provided `config`.
    pub fn with_config(mut self, config: FingerprintConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a new [Searcher] with the provided `search_percentage`.
    pub fn with_search_percentage(mut self, search_percentage: f32) -> Self {
        self.search_percentage = search_percentage;
        self
    }

    /// Returns a new [Searcher] with the provided `time_padding`.
    pub fn with_time_padding(mut self, time_padding: Duration) -> Self {
        self.time_padding = time_padding;
        self
    }

    fn search(&self, target: &Path) -> Result<SearchResult> {
        let span = tracing::span!(tracing::Level::TRACE, "search");
        let _enter = span.enter();

        tracing::debug!("starting search in {}", target.display());

        let source = super::open_file(target, self.reference.sample_rate())?;
        let sample_rate = source.sample_rate();
        let frames = (source.total_frames() as f64 * f64::from(self.search_percentage)) as usize;
        let source = Segment::new(source, 0, Some(frames))?;

        let m = find_best_alignment(&self.reference, source, &self.config)?;

        let window_size = self.config.window_size();
        let start = util::window_offset(m.index, window_size, sample_rate);
        let end = util::window_offset(m.index + self.reference.len(), window_size, sample_rate);
        // Add a buffer between actual detected times and what we return to users.
        let padded_start = start + self.time_padding;
        let padded_end = end.saturating_sub(self.time_padding).max(padded_start);

        tracing::debug!(
            index = m.index,
            score = m.score,
            "finished search in {}",
            target.display()
        );

        Ok(SearchResult {
            index: m.index,
            score: m.score,
            start: padded_start,
            end: padded_end,
        })
    }

    fn match_file_path(target: &Path) -> PathBuf {
        target.to_owned().with_extension(super::MATCH_FILE_EXT)
    }

    /// MD5 over everything besides the target that affects a [SearchResult]: the reference
    /// windows, the read parameters, the search percentage and the time padding.
    fn compute_search_md5sum(&self) -> String {
        let mut ctx = md5::Context::new();
        ctx.consume(self.reference.sample_rate().to_le_bytes());
        for param in [
            self.reference.window_size(),
            self.reference.top_k(),
            self.config.window_size(),
            self.config.top_k(),
            self.reference.len(),
        ] {
            ctx.consume((param as u64).to_le_bytes());
        }
        for window in self.reference.windows() {
            ctx.consume((window.len() as u64).to_le_bytes());
            for freq in window.frequencies() {
                ctx.consume(freq.to_le_bytes());
            }
        }
        ctx.consume(self.search_percentage.to_le_bytes());
        ctx.consume(self.time_padding.as_nanos().to_le_bytes());
        format!("{:x}", ctx.compute())
    }

    /// Returns the stored result for `target` if its match file is up-to-date.
    fn check_match_file(
        target: impl AsRef<Path>,
        search_md5: &str,
    ) -> Result<Option<SearchResult>> {
        let match_file = Self::match_file_path(target.as_ref());
        if !match_file.exists() {
            return Ok(None);
        }

        // Compute MD5 hash of the target header.
        let md5 = util::compute_header_md5sum(target)?;

        // Read existing match file and compare MD5 hashes. An unreadable match file is stale.
        let f = std::fs::File::open(&match_file)?;
        let match_file: MatchFile = match serde_json::from_reader(&f) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };

        if match_file.md5 != md5 || match_file.search_md5 != search_md5 {
            return Ok(None);
        }
        Ok(match_file.search_result())
    }

    fn create_match_file(
        &self,
        target: impl AsRef<Path>,
        result: SearchResult,
        search_md5: &str,
    ) -> Result<()> {
        let md5 = util::compute_header_md5sum(&target)?;
        let mut f = std::fs::File::create(Self::match_file_path(target.as_ref()))?;
        let data = MatchFile {
            intro: (result.start.as_secs_f32(), result.end.as_secs_f32()),
            index: result.index,
            score: result.score,
            md5,
            search_md5: search_md5.to_string(),
        };
        serde_json::to_writer(&mut f, &data)?;

        Ok(())
    }

    fn display_search_result(&self, result: SearchResult) {
        println!(
            "* Intro - {}-{} (window {}, score {})",
            util::format_time(result.start),
            util::format_time(result.end),
            result.index,
            result.score,
        );
    }
}

impl<P: AsRef<Path> + Ord + Sync> Searcher<P> {
    /// Runs the searcher.
    ///
    /// * If `display` is set, the results will be printed to stdout.
    /// * If `use_match_files` is set, targets that already have an up-to-date match file on disk
    /// are not searched again; the stored result is returned instead. A match file is only
    /// up-to-date if both the target header and the search (reference and parameters) match. If `write_match_files` is set, a match file is written alongside each target
    /// once its search completes.
    /// * If `threading` is set (and the `rayon` feature is enabled), targets are searched in
    /// parallel.
    ///
    /// A target that cannot be searched is reported and left out of the result; the other
    /// targets are unaffected.
    pub fn run(
        &self,
        display: bool,
        use_match_files: bool,
        write_match_files: bool,
        threading: bool,
    ) -> Result<BTreeMap<PathBuf, SearchResult>> {
        if self.targets.is_empty() {
            return Err(Error::SearcherMissingPaths);
        }
        self.config.validate()?;

        let search_md5 = self.compute_search_md5sum();
        let mut match_map = BTreeMap::new();

        let mut pending = Vec::new();
        for target in &self.targets {
            let target = target.as_ref();
            // Reuse results from up-to-date match files.
            if use_match_files {
                if let Some(result) = Self::check_match_file(target, &search_md5)? {
                    if display {
                        println!("\n{}\n", target.display());
                        println!("Using existing match file...");
                        self.display_search_result(result);
                    }
                    match_map.insert(target.to_owned(), result);
                    continue;
                }
            }
            pending.push(target);
        }

        let mut data = Vec::new();

        if cfg!(feature = "rayon") && threading {
            // Perform the search in parallel for all targets.
            #[cfg(feature = "rayon")]
            {
                data = pending
                    .par_iter()
                    .map(|target| (*target, self.search(target)))
                    .collect::<Vec<_>>();
            }
        } else {
            data.extend(pending.iter().map(|target| (*target, self.search(target))));
        }

        for (target, result) in data {
            if display {
                println!("\n{}\n", target.display());
            }
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("search failed for {}: {}", target.display(), e);
                    if display {
                        println!("Search failed: {}", e);
                    }
                    continue;
                }
            };
            if display {
                self.display_search_result(result);
            }
            if write_match_files {
                self.create_match_file(target, result, &search_md5)?;
            }
            match_map.insert(target.to_owned(), result);
        }

        Ok(match_map)
    }
}
