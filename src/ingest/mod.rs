//! Streaming dump ingestion.
//!
//! The dump is a compressed stream of article records. [`DumpIngester`]
//! reads it line by line exactly once, tracking article boundaries
//! (`<title>` markers) and the target-language section (`==Language==`
//! headers). Each flushed article writes one `(title, body)` record to the
//! entry store in batches and contributes any form-of relations found in
//! its body to the returned [`RelationTable`].

pub mod wikitext;

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Instant;

use ahash::AHashSet;
use bzip2::read::BzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::error::{Result, RootFreqError};
use crate::store::EntryWriter;
use crate::tree::RelationTable;

/// Default sanity floor for dump size; real lexicographic dumps are large.
pub const DEFAULT_MIN_DUMP_BYTES: u64 = 10 * 1024 * 1024;

/// Records appended between store commits.
pub const DEFAULT_BATCH_SIZE: u64 = 100_000;

/// Lines between progress updates.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Configuration for one ingestion pass.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Two-letter language code, used for relation-tag arguments.
    pub lang_code: String,
    /// Section header name, e.g. `Spanish` for `==Spanish==`.
    pub language: String,
    /// Reject dumps smaller than this many bytes.
    pub min_dump_bytes: u64,
    /// Store records per commit.
    pub batch_size: u64,
    /// Whether to draw a progress spinner on stderr.
    pub show_progress: bool,
}

impl IngestConfig {
    /// Config for a language with default limits.
    pub fn new<S: Into<String>, T: Into<String>>(lang_code: S, language: T) -> Self {
        IngestConfig {
            lang_code: lang_code.into().to_lowercase(),
            language: language.into(),
            min_dump_bytes: DEFAULT_MIN_DUMP_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: true,
        }
    }
}

/// Counters for one ingestion pass. Informational only.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    /// Lines read from the dump.
    pub lines: u64,
    /// Entries written to the store.
    pub entries: u64,
    /// Duplicate titles that overwrote an earlier entry.
    pub overwrites: u64,
    /// Relation tags that matched the shape but could not be processed.
    pub malformed_tags: u64,
}

/// Streams a dump into an entry store and a relation table.
#[derive(Debug)]
pub struct DumpIngester {
    config: IngestConfig,
}

impl DumpIngester {
    /// Create an ingester for the given configuration.
    pub fn new(config: IngestConfig) -> Self {
        DumpIngester { config }
    }

    /// Ingest `dump_path`, writing entries through `writer`.
    ///
    /// The dump is processed strictly sequentially; the only state carried
    /// between lines is the current article and section flag. Returns the
    /// relation table and the pass counters. The caller is responsible for
    /// calling [`EntryWriter::finish`] afterwards.
    pub fn ingest(
        &self,
        dump_path: &Path,
        writer: &mut EntryWriter,
    ) -> Result<(RelationTable, IngestStats)> {
        let metadata = std::fs::metadata(dump_path)
            .map_err(|_| RootFreqError::DumpNotFound(dump_path.to_path_buf()))?;
        if metadata.len() < self.config.min_dump_bytes {
            return Err(RootFreqError::DumpTooSmall {
                path: dump_path.to_path_buf(),
                size: metadata.len(),
                min: self.config.min_dump_bytes,
            });
        }

        let compressed = dump_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("bz2"));
        let file = File::open(dump_path)
            .map_err(|_| RootFreqError::DumpNotFound(dump_path.to_path_buf()))?;
        let reader: Box<dyn Read> = if compressed {
            Box::new(BzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let reader = BufReader::with_capacity(1 << 20, reader);

        self.scan(reader, compressed, writer)
    }

    fn scan<R: BufRead>(
        &self,
        reader: R,
        compressed: bool,
        writer: &mut EntryWriter,
    ) -> Result<(RelationTable, IngestStats)> {
        let section_header = format!("=={}==", self.config.language);
        let start = Instant::now();
        let progress = self.progress_bar();

        let mut stats = IngestStats::default();
        let mut relations = RelationTable::default();
        let mut seen: AHashSet<String> = AHashSet::new();

        let mut title_line = String::new();
        let mut entry: Vec<String> = Vec::new();
        let mut in_target = false;

        for line in reader.lines() {
            let line = line.map_err(|e| {
                if compressed {
                    RootFreqError::corrupt_dump(e.to_string())
                } else {
                    RootFreqError::from(e)
                }
            })?;
            let line = line.trim();

            stats.lines += 1;
            if stats.lines % PROGRESS_INTERVAL == 0 {
                let rate = stats.lines as f64 / start.elapsed().as_secs_f64();
                progress.set_message(format!(
                    "Lines: {} | Entries: {} | Rate: {:.0} ln/s",
                    stats.lines, stats.entries, rate
                ));
            }

            if line.starts_with("<title>") {
                self.flush(
                    &title_line,
                    &entry,
                    writer,
                    &mut relations,
                    &mut seen,
                    &mut stats,
                )?;
                entry.clear();
                title_line = line.to_string();
                in_target = false;
                continue;
            }

            if in_target {
                // A new h2 header ends the target-language section.
                if line.starts_with("==") && !line.contains("===") {
                    in_target = false;
                } else if !line.starts_with('<') {
                    entry.push(line.to_string());
                }
            } else if line.contains(&section_header) {
                in_target = true;
            }
        }

        // Flush the trailing article and the final partial batch.
        self.flush(
            &title_line,
            &entry,
            writer,
            &mut relations,
            &mut seen,
            &mut stats,
        )?;
        writer.commit()?;
        progress.finish_and_clear();

        info!(
            "ingested {} entries from {} lines ({} overwrites, {} malformed tags)",
            stats.entries, stats.lines, stats.overwrites, stats.malformed_tags
        );
        Ok((relations, stats))
    }

    /// Write the accumulated article, if it had target-language content.
    fn flush(
        &self,
        title_line: &str,
        entry: &[String],
        writer: &mut EntryWriter,
        relations: &mut RelationTable,
        seen: &mut AHashSet<String>,
        stats: &mut IngestStats,
    ) -> Result<()> {
        if entry.is_empty() {
            return Ok(());
        }
        let Some(word) = wikitext::strip_title(title_line) else {
            warn!("could not recover title from {title_line:?}");
            return Ok(());
        };

        if !seen.insert(word.clone()) {
            // The dump format legitimately repeats redirects and variants.
            warn!("overwriting entry: {word}");
            stats.overwrites += 1;
        }

        writer.put(&word, &entry.join("\n"))?;
        stats.entries += 1;
        if stats.entries % self.config.batch_size == 0 {
            writer.commit()?;
        }

        let scan =
            wikitext::scan_relations(entry.iter().map(|s| s.as_str()), &self.config.lang_code);
        stats.malformed_tags += scan.malformed;
        if !scan.relations.is_empty() {
            relations.insert(word, scan.relations);
        }
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            pb.set_style(style);
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryStore;

    fn test_config() -> IngestConfig {
        let mut config = IngestConfig::new("es", "Spanish");
        config.min_dump_bytes = 0;
        config.show_progress = false;
        config
    }

    fn sample_dump() -> String {
        [
            "<page>",
            "<title>correr</title>",
            "<text>",
            "==Spanish==",
            "===Verb===",
            "{{es-verb}}",
            "to run",
            "==English==",
            "not this line",
            "</page>",
            "<title>corriendo</title>",
            "==Spanish==",
            "===Verb===",
            "{{gerund of|es|correr}}",
            "</text>",
        ]
        .join("\n")
    }

    fn ingest_str(dump: &str, dir: &Path) -> (RelationTable, IngestStats) {
        let dump_path = dir.join("dump.xml");
        std::fs::write(&dump_path, dump).unwrap();
        let store_dir = dir.join("store");
        let mut writer = EntryStore::create(&store_dir).unwrap();
        let ingester = DumpIngester::new(test_config());
        let result = ingester.ingest(&dump_path, &mut writer).unwrap();
        writer.finish().unwrap();
        result
    }

    #[test]
    fn test_ingest_extracts_target_language_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (relations, stats) = ingest_str(&sample_dump(), dir.path());
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.overwrites, 0);

        let store = EntryStore::open(&dir.path().join("store")).unwrap();
        let entry = store.get("correr").unwrap().unwrap();
        assert!(entry.contains("to run"));
        assert!(!entry.contains("not this line"));

        let rels = relations.get("corriendo").unwrap();
        assert_eq!(rels[0].root, "correr");
        assert_eq!(rels[0].tag, "gerund of");
        assert!(!relations.contains_key("correr"));
    }

    #[test]
    fn test_duplicate_title_overwrites() {
        let dump = [
            "<title>casa</title>",
            "==Spanish==",
            "first body",
            "<title>casa</title>",
            "==Spanish==",
            "second body",
        ]
        .join("\n");
        let dir = tempfile::tempdir().unwrap();
        let (_, stats) = ingest_str(&dump, dir.path());
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.overwrites, 1);

        let store = EntryStore::open(&dir.path().join("store")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("casa").unwrap().as_deref(), Some("second body"));
    }

    #[test]
    fn test_articles_without_target_section_skipped() {
        let dump = [
            "<title>maison</title>",
            "==French==",
            "une maison",
            "<title>casa</title>",
            "==Spanish==",
            "una casa",
        ]
        .join("\n");
        let dir = tempfile::tempdir().unwrap();
        let (_, stats) = ingest_str(&dump, dir.path());
        assert_eq!(stats.entries, 1);

        let store = EntryStore::open(&dir.path().join("store")).unwrap();
        assert!(store.contains("casa"));
        assert!(!store.contains("maison"));
    }

    #[test]
    fn test_missing_dump_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = EntryStore::create(&dir.path().join("store")).unwrap();
        let ingester = DumpIngester::new(test_config());
        let result = ingester.ingest(&dir.path().join("nope.xml.bz2"), &mut writer);
        assert!(matches!(result, Err(RootFreqError::DumpNotFound(_))));
    }

    #[test]
    fn test_small_dump_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("dump.xml");
        std::fs::write(&dump_path, "tiny").unwrap();

        let mut config = test_config();
        config.min_dump_bytes = 1024;
        let mut writer = EntryStore::create(&dir.path().join("store")).unwrap();
        let result = DumpIngester::new(config).ingest(&dump_path, &mut writer);
        assert!(matches!(result, Err(RootFreqError::DumpTooSmall { .. })));
    }
}
