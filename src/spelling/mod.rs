//! Diacritic-stripped spelling lookup.
//!
//! Users typing without accents still deserve a hit: the index maps each
//! unaccented rendering back to the accented originals sharing it, derived
//! once from the entry store's key set and cached as JSON.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;
use log::{debug, info};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::Result;

/// Strip diacritics by NFD-decomposing and dropping combining marks.
pub fn strip_accents(word: &str) -> String {
    word.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Mapping from unaccented forms to the accented originals they could be.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpellingIndex {
    map: AHashMap<String, Vec<String>>,
}

impl SpellingIndex {
    /// Build the index from a word set. Only words whose stripped form
    /// differs from the original are indexed.
    pub fn build<'a, I>(words: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut map: AHashMap<String, Vec<String>> = AHashMap::new();
        for word in words {
            let basic = strip_accents(word);
            if basic != word {
                map.entry(basic).or_default().push(word.to_string());
            }
        }
        for originals in map.values_mut() {
            originals.sort_unstable();
        }
        info!("built spelling index with {} unaccented forms", map.len());
        SpellingIndex { map }
    }

    /// Accented candidates for an unaccented form.
    pub fn candidates(&self, word: &str) -> Option<&[String]> {
        self.map.get(word).map(|v| v.as_slice())
    }

    /// Number of indexed unaccented forms.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Persist the index as sorted JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let ordered: BTreeMap<&String, &Vec<String>> = self.map.iter().collect();
        let file = File::create(path)?;
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer(&mut writer, &ordered)?;
        writer.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Load a cached index.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let map: AHashMap<String, Vec<String>> = serde_json::from_reader(reader)?;
        Ok(SpellingIndex { map })
    }

    /// Load the cached index, or build it from `words` and cache it.
    pub fn load_or_build<'a, I>(path: &Path, words: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if path.is_file() {
            debug!("loading spelling index from {}", path.display());
            return Self::load(path);
        }
        let index = Self::build(words);
        index.save(path)?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_accents() {
        assert_eq!(strip_accents("está"), "esta");
        assert_eq!(strip_accents("açaí"), "acai");
        assert_eq!(strip_accents("plain"), "plain");
    }

    #[test]
    fn test_only_accented_words_indexed() {
        let index = SpellingIndex::build(["está", "esta", "correr"]);
        // "esta" is already unaccented and "correr" strips to itself.
        assert_eq!(index.len(), 1);
        assert_eq!(index.candidates("esta").unwrap(), &["está".to_string()]);
        assert!(index.candidates("correr").is_none());
    }

    #[test]
    fn test_multiple_candidates_sorted() {
        let index = SpellingIndex::build(["té", "te̍"]);
        let candidates = index.candidates("te").unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spelling.json");
        let built = SpellingIndex::load_or_build(&path, ["está", "más"]).unwrap();
        assert!(path.is_file());

        // Second call loads the cache instead of rebuilding.
        let loaded = SpellingIndex::load_or_build(&path, []).unwrap();
        assert_eq!(loaded, built);
    }
}
