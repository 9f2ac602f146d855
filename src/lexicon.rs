//! The per-language session object and its query API.
//!
//! A [`Lexicon`] owns everything a query needs: the entry store, the
//! forward word tree and reverse index, the frequency table, and the
//! spelling index. Opening a lexicon drives the resumable build pipeline:
//! stages that already completed (per [`BuildState`]) are skipped, stages
//! whose artifacts went missing are rerun, and a crash mid-stage is
//! recovered by rerunning just that stage.

use std::path::{Path, PathBuf};

use ahash::AHashSet;
use log::info;

use crate::error::{Result, RootFreqError};
use crate::frequency::FrequencyTable;
use crate::ingest::{DumpIngester, IngestConfig, DEFAULT_MIN_DUMP_BYTES};
use crate::spelling::SpellingIndex;
use crate::state::BuildState;
use crate::store::EntryStore;
use crate::tree::builder::TreeBuilder;
use crate::tree::{
    load_relations, save_relations, ArtifactFormat, ReverseIndex, Triple, WordTree,
};

/// Floor for outlier baselines, so absent words still yield finite ratios.
const BASELINE_FLOOR: f64 = 0.1;

/// Configuration for opening a [`Lexicon`].
#[derive(Debug, Clone)]
pub struct LexiconConfig {
    /// Two-letter language code, used to namespace the cache.
    pub lang_code: String,
    /// Language section name as it appears in the dump, e.g. `Spanish`.
    pub language: String,
    /// Root directory under which per-language caches live.
    pub cache_root: PathBuf,
    /// The dump to ingest. Only needed until the entries stage completed.
    pub dump_path: Option<PathBuf>,
    /// The frequency corpus to load.
    pub frequency_path: PathBuf,
    /// Encoding for cached artifacts.
    pub format: ArtifactFormat,
    /// Rerun the tree stage even if marked finished.
    pub force_tree_rebuild: bool,
    /// Reject dumps smaller than this many bytes.
    pub min_dump_bytes: u64,
    /// Whether ingestion draws a progress spinner.
    pub show_progress: bool,
}

impl LexiconConfig {
    /// Config with default artifact format and limits.
    pub fn new<S, T, P, Q>(lang_code: S, language: T, cache_root: P, frequency_path: Q) -> Self
    where
        S: Into<String>,
        T: Into<String>,
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        LexiconConfig {
            lang_code: lang_code.into().to_lowercase(),
            language: language.into(),
            cache_root: cache_root.into(),
            dump_path: None,
            frequency_path: frequency_path.into(),
            format: ArtifactFormat::default(),
            force_tree_rebuild: false,
            min_dump_bytes: DEFAULT_MIN_DUMP_BYTES,
            show_progress: true,
        }
    }
}

/// Options for [`Lexicon::total_freq`].
#[derive(Debug, Clone)]
pub struct TotalFreqOptions {
    /// Restrict counting to forms whose chain passes through this node.
    pub branch: Option<String>,
    /// Forms below this fpm are counted but not enumerated.
    pub threshold: f64,
    /// Exclude starred outlier mass from the returned total.
    pub nostars: bool,
    /// Star a form when its fpm reaches this multiple of the baseline.
    pub highstars: f64,
}

impl Default for TotalFreqOptions {
    fn default() -> Self {
        TotalFreqOptions {
            branch: None,
            threshold: 0.05,
            nostars: false,
            highstars: 8.0,
        }
    }
}

/// One enumerated form in a [`FreqReport`].
#[derive(Debug, Clone)]
pub struct FreqRow {
    /// The form, empty for annotation-only rows.
    pub form: String,
    /// The form's own fpm.
    pub fpm: f64,
    /// Outlier stars; 0 for ordinary forms.
    pub stars: u32,
    /// Whether this row is the root itself.
    pub is_root: bool,
    /// Relation tag and immediate root, joined for display.
    pub tag: String,
    /// True when the form was already counted and this row only carries
    /// an additional tag annotation.
    pub annotation_only: bool,
}

/// Result of aggregating fpm across a root's forms.
#[derive(Debug, Clone)]
pub struct FreqReport {
    /// The root everything was aggregated under.
    pub root: String,
    /// Summed fpm over all distinct counted forms.
    pub total_fpm: f64,
    /// Mass of the starred outlier forms.
    pub starred_fpm: f64,
    /// Forms counted but below the display threshold.
    pub skipped: usize,
    /// Detail rows in sorted form order.
    pub rows: Vec<FreqRow>,
}

/// A per-language lexicon session.
///
/// Owns the backing store handle; [`Lexicon::close`] releases it.
#[derive(Debug)]
pub struct Lexicon {
    lang_code: String,
    store: EntryStore,
    word_tree: WordTree,
    reverse: ReverseIndex,
    freq: FrequencyTable,
    spellings: SpellingIndex,
}

impl Lexicon {
    /// Open (building or resuming as needed) the lexicon for a language.
    pub fn open(config: LexiconConfig) -> Result<Self> {
        let cache_dir = config.cache_root.join(&config.lang_code);
        std::fs::create_dir_all(&cache_dir)?;

        let mut state = BuildState::load(&cache_dir)?;
        let format = if state.entries_finished {
            state.format
        } else {
            config.format
        };
        let roots_path = artifact_path(&cache_dir, "roots", format);
        let tree_path = artifact_path(&cache_dir, "tree", format);
        let reverse_path = artifact_path(&cache_dir, "reverse", format);
        let spelling_path = cache_dir.join("spelling.json");

        // A finished flag is only trusted when the artifacts really exist.
        if state.entries_finished && !(EntryStore::exists(&cache_dir) && roots_path.is_file()) {
            state.reset();
        }

        if !state.entries_finished {
            let dump_path = config.dump_path.as_ref().ok_or_else(|| {
                RootFreqError::missing_artifact(
                    "entry store not built and no dump path configured",
                )
            })?;
            info!(
                "building {} entry store in {}",
                config.language,
                cache_dir.display()
            );

            // The spelling index derives from the entry set; a rebuilt set
            // must not load a cached index from the previous one.
            if spelling_path.is_file() {
                std::fs::remove_file(&spelling_path)?;
            }

            let mut writer = EntryStore::create(&cache_dir)?;
            let mut ingest_config = IngestConfig::new(&config.lang_code, &config.language);
            ingest_config.min_dump_bytes = config.min_dump_bytes;
            ingest_config.show_progress = config.show_progress;
            let ingester = DumpIngester::new(ingest_config);

            let (relations, _stats) = ingester.ingest(dump_path, &mut writer)?;
            writer.finish()?;
            save_relations(&relations, &roots_path, format)?;
            state.format = format;
            state.tree_finished = false;
            state.finish_entries(&cache_dir)?;
        }

        if state.tree_finished && !(tree_path.is_file() && reverse_path.is_file()) {
            state.tree_finished = false;
        }

        if !state.tree_finished || config.force_tree_rebuild {
            info!("building word tree for {}", config.lang_code);
            let relations = load_relations(&roots_path, state.format)?;
            let (word_tree, reverse) = TreeBuilder::new().build(&relations);
            word_tree.save(&tree_path, state.format)?;
            reverse.save(&reverse_path, state.format)?;
            state.finish_tree(&cache_dir)?;
        }

        let word_tree = WordTree::load(&tree_path, state.format)?;
        let reverse = ReverseIndex::load(&reverse_path, state.format)?;
        let store = EntryStore::open(&cache_dir)?;
        let freq = FrequencyTable::load(&config.frequency_path)?;
        let spellings = SpellingIndex::load_or_build(&spelling_path, store.words())?;

        info!(
            "opened {} lexicon: {} entries, {} roots, {} frequency words",
            config.lang_code,
            store.len(),
            word_tree.len(),
            freq.len()
        );
        Ok(Lexicon {
            lang_code: config.lang_code,
            store,
            word_tree,
            reverse,
            freq,
            spellings,
        })
    }

    /// The language code this session serves.
    pub fn lang_code(&self) -> &str {
        &self.lang_code
    }

    /// The forward root→forms tree.
    pub fn word_tree(&self) -> &WordTree {
        &self.word_tree
    }

    /// The reverse form→roots index.
    pub fn reverse_index(&self) -> &ReverseIndex {
        &self.reverse
    }

    /// The loaded frequency table.
    pub fn frequency(&self) -> &FrequencyTable {
        &self.freq
    }

    /// Frequency per million for a word.
    pub fn fpm(&self, word: &str) -> f64 {
        self.freq.fpm(word)
    }

    /// Raw entry text for a word, if stored.
    pub fn lookup_entry(&self, word: &str) -> Result<Option<String>> {
        self.store.get(word)
    }

    /// Find the best root of a word.
    ///
    /// Returns `None` when the word is itself a root (no further resolution
    /// needed) or unknown. With multiple candidate roots the
    /// highest-frequency one wins; equal frequencies fall back to
    /// lexicographic order with the greatest string winning, so the choice
    /// is deterministic.
    pub fn find_root(&self, word: &str) -> Option<String> {
        if self.word_tree.contains_root(word) {
            return None;
        }
        let roots = self.reverse.get(word)?;
        if roots.len() == 1 {
            return Some(roots[0].clone());
        }
        roots
            .iter()
            .max_by(|a, b| {
                self.fpm(a)
                    .partial_cmp(&self.fpm(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            })
            .cloned()
    }

    /// Baseline fpm for outlier detection: the highest fpm among the given
    /// words, floored at 0.1 so absent words still produce finite ratios.
    pub fn calc_baseline<'a, I>(&self, words: I) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut baseline = BASELINE_FLOOR;
        for word in words {
            if word.is_empty() {
                continue;
            }
            let fpm = self.fpm(word);
            if fpm > baseline {
                baseline = fpm;
            }
        }
        baseline
    }

    /// Aggregate fpm across all of a word's known forms.
    ///
    /// Resolves the word's root (falling back to the word itself), then
    /// sums fpm over the root's full triple set plus the root. Each
    /// distinct form counts once; further tags on an already-counted form
    /// become annotation rows rather than double-counting.
    pub fn total_freq(&self, word: &str, options: &TotalFreqOptions) -> FreqReport {
        let root = self.find_root(word).unwrap_or_else(|| word.to_string());

        let mut subs: Vec<Triple> = self
            .word_tree
            .get(&root)
            .map(|s| s.to_vec())
            .unwrap_or_default();
        // The root itself joins as a zero-relation member.
        subs.push(Triple {
            form: root.clone(),
            tag: String::new(),
            root: String::new(),
        });
        subs.sort_unstable();

        let baseline = self.calc_baseline(
            [
                root.as_str(),
                word,
                options.branch.as_deref().unwrap_or(""),
            ]
            .into_iter(),
        );

        let mut found: AHashSet<&str> = AHashSet::new();
        let mut total = 0.0;
        let mut starred = 0.0;
        let mut skipped = 0;
        let mut rows: Vec<FreqRow> = Vec::new();

        for triple in &subs {
            let form = triple.form.as_str();
            let hits = self.fpm(form);
            let is_root = form == root;
            let already_counted = found.contains(form);
            let mut stars = 0u32;

            if !already_counted {
                if let Some(branch) = &options.branch {
                    if &triple.root == branch || form == branch.as_str() {
                        total += hits;
                    } else {
                        found.insert(form);
                        continue;
                    }
                } else {
                    total += hits;
                }

                // The root is never an outlier of itself.
                if !is_root && hits / baseline >= options.highstars {
                    starred += hits;
                    stars = ((hits / baseline) / options.highstars).sqrt() as u32;
                }

                if hits < options.threshold {
                    skipped += 1;
                    found.insert(form);
                    continue;
                }
            }

            let tag = format!("{} {}", triple.tag, triple.root)
                .trim()
                .to_string();
            if already_counted {
                if !tag.is_empty() {
                    rows.push(FreqRow {
                        form: String::new(),
                        fpm: 0.0,
                        stars: 0,
                        is_root: false,
                        tag,
                        annotation_only: true,
                    });
                }
            } else {
                rows.push(FreqRow {
                    form: form.to_string(),
                    fpm: hits,
                    stars,
                    is_root,
                    tag,
                    annotation_only: false,
                });
            }
            found.insert(form);
        }

        let total_fpm = if options.nostars {
            total - starred
        } else {
            total
        };
        FreqReport {
            root,
            total_fpm,
            starred_fpm: starred,
            skipped,
            rows,
        }
    }

    /// Best-effort diacritic correction.
    ///
    /// A word present in the store is returned unchanged. An unaccented
    /// rendering of known accented words returns the most frequent
    /// candidate (ties broken lexicographically, greatest wins). Anything
    /// else passes through untouched.
    pub fn check_spelling(&self, word: &str) -> String {
        if self.store.contains(word) {
            return word.to_string();
        }
        if let Some(candidates) = self.spellings.candidates(word) {
            if candidates.len() == 1 {
                return candidates[0].clone();
            }
            if let Some(best) = candidates.iter().max_by(|a, b| {
                self.fpm(a)
                    .partial_cmp(&self.fpm(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            }) {
                return best.clone();
            }
        }
        word.to_string()
    }

    /// Release the backing store handle. Queries needing the store fail
    /// afterwards; the in-memory indexes remain readable.
    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }
}

fn artifact_path(cache_dir: &Path, stem: &str, format: ArtifactFormat) -> PathBuf {
    cache_dir.join(format!("{stem}.{}", format.extension()))
}
