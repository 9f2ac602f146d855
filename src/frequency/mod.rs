//! Frequency corpus loading and per-million statistics.
//!
//! A frequency corpus is a text file of `word count` lines, optionally
//! compressed. [`FrequencyTable`] holds the parsed word→count map together
//! with the corpus total, and converts raw counts into fpm
//! (frequency per million words).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use ahash::AHashMap;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::{debug, warn};
use xz2::read::XzDecoder;

use crate::error::{Result, RootFreqError};

/// Reserved key for sources that carry a pre-aggregated total.
pub const TOTAL_KEY: &str = "__TOTAL__";

/// A corpus with fewer distinct words than this is treated as malformed.
const MIN_DISTINCT_WORDS: usize = 10;

/// A word→count table over a frequency corpus.
///
/// The table is immutable once loaded. All fpm values are derived from the
/// corpus total, which is either the sum of all parsed counts or an explicit
/// total stored in the source under [`TOTAL_KEY`].
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    counts: AHashMap<String, u64>,
    total: u64,
}

/// One point of a coverage curve: the fraction of total corpus mass
/// contributed by words at or above an fpm threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoveragePoint {
    /// The fpm cutoff.
    pub threshold_fpm: f64,
    /// Fraction of the corpus total covered by words at or above the cutoff.
    pub fraction: f64,
}

impl FrequencyTable {
    /// Load a frequency corpus from a file.
    ///
    /// The compression format is selected by extension: `.txt` plain text,
    /// `.gz`, `.bz2` or `.xz`. Anything else fails with
    /// [`RootFreqError::UnsupportedFormat`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_reader(path)?;
        let table = Self::from_reader(reader)?;
        debug!(
            "loaded frequency table from {}: {} words, total {}",
            path.display(),
            table.len(),
            table.total()
        );
        Ok(table)
    }

    /// Parse a frequency corpus from any buffered reader.
    ///
    /// Each line is `word<whitespace>count`. Words starting with `#` are
    /// comments; lines with fewer than two fields are skipped; thousands
    /// separators in the count are stripped; an unparseable count is logged
    /// and skipped, never fatal.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut counts: AHashMap<String, u64> = AHashMap::new();
        let mut sum: u64 = 0;
        let mut explicit_total: Option<u64> = None;
        let mut bad_lines: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (word, raw_count) = match (fields.next(), fields.next()) {
                (Some(w), Some(c)) => (w, c),
                _ => continue,
            };
            if word.starts_with('#') {
                continue;
            }

            let count = match raw_count.replace(',', "").parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    bad_lines += 1;
                    warn!("skipping unparseable count for {word:?}: {raw_count:?}");
                    continue;
                }
            };

            if word == TOTAL_KEY {
                explicit_total = Some(count);
                continue;
            }
            sum += count;
            counts.insert(word.to_string(), count);
        }

        if bad_lines > 0 {
            warn!("skipped {bad_lines} unparseable frequency lines");
        }
        if counts.len() < MIN_DISTINCT_WORDS {
            return Err(RootFreqError::InvalidFrequencyTable(format!(
                "only {} distinct words (minimum {MIN_DISTINCT_WORDS})",
                counts.len()
            )));
        }

        let total = explicit_total.unwrap_or(sum);
        if total == 0 {
            return Err(RootFreqError::InvalidFrequencyTable(
                "corpus total is zero".to_string(),
            ));
        }

        Ok(FrequencyTable { counts, total })
    }

    /// Build a table directly from counts. The total is the sum of counts
    /// unless `total` provides an explicit corpus size.
    pub fn from_counts<I>(entries: I, total: Option<u64>) -> Result<Self>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let counts: AHashMap<String, u64> = entries.into_iter().collect();
        let total = total.unwrap_or_else(|| counts.values().sum());
        if total == 0 {
            return Err(RootFreqError::InvalidFrequencyTable(
                "corpus total is zero".to_string(),
            ));
        }
        Ok(FrequencyTable { counts, total })
    }

    /// Raw occurrence count for a word, 0 if absent.
    pub fn count(&self, word: &str) -> u64 {
        self.counts.get(word).copied().unwrap_or(0)
    }

    /// Frequency per million words.
    pub fn fpm(&self, word: &str) -> f64 {
        self.count(word) as f64 / self.total as f64 * 1e6
    }

    /// Total corpus mass.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Compute corpus coverage for a set of fpm thresholds.
    ///
    /// Counts are sorted descending once and prefix-summed; each threshold
    /// is then answered by binary search against its raw-count cutoff.
    /// O(n log n) regardless of input ordering.
    pub fn coverage(&self, thresholds_fpm: &[f64]) -> Vec<CoveragePoint> {
        let mut sorted: Vec<u64> = self.counts.values().copied().collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        let mut prefix: Vec<u64> = Vec::with_capacity(sorted.len() + 1);
        prefix.push(0);
        let mut running = 0u64;
        for &c in &sorted {
            running += c;
            prefix.push(running);
        }

        thresholds_fpm
            .iter()
            .map(|&threshold_fpm| {
                let cutoff = threshold_fpm * self.total as f64 / 1e6;
                // Counts are descending, so the words at or above the cutoff
                // form a prefix of the sorted array.
                let at_or_above = sorted.partition_point(|&c| c as f64 >= cutoff);
                let fraction = prefix[at_or_above] as f64 / self.total as f64;
                CoveragePoint {
                    threshold_fpm,
                    fraction,
                }
            })
            .collect()
    }
}

/// Open a frequency source, picking a decompressor by file extension.
fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let file = File::open(path)?;
    let reader: Box<dyn Read> = match ext.as_str() {
        "txt" => Box::new(file),
        "gz" => Box::new(GzDecoder::new(file)),
        "bz2" => Box::new(BzDecoder::new(file)),
        "xz" => Box::new(XzDecoder::new(file)),
        other => {
            return Err(RootFreqError::UnsupportedFormat(format!(
                "unsupported frequency file extension: .{other} (expected .txt, .gz, .bz2 or .xz)"
            )));
        }
    };
    Ok(Box::new(BufReader::new(reader)))
}
