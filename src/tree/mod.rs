//! Word-tree data structures and their persisted artifacts.
//!
//! A [`RelationTable`] maps each form to the `(root, tag)` relations found
//! in its dictionary entry. [`TreeBuilder`](builder::TreeBuilder) resolves
//! those chains into a [`WordTree`] (root → every form that reduces to it)
//! and a [`ReverseIndex`] (form → candidate final roots).
//!
//! All three structures are serialized for reuse between runs, either as
//! bincode rows (fast reload) or JSON (portable); artifacts are written in
//! sorted row order so rebuilding from unchanged inputs is byte-identical.

pub mod builder;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RootFreqError};

/// How cached artifacts are encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Row-oriented bincode, the fast-reload default.
    #[default]
    Bincode,
    /// Plain JSON, readable and portable.
    Json,
}

impl ArtifactFormat {
    /// File extension used for artifacts in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Bincode => "bin",
            ArtifactFormat::Json => "json",
        }
    }
}

/// One relation extracted from an entry: this form is `tag` of `root`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    /// The root word the relation points at.
    pub root: String,
    /// The relation tag, e.g. `gerund of`.
    pub tag: String,
}

/// One hop of a resolved relation chain: `form` is `tag` of `root`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// The inflected or derived surface word.
    pub form: String,
    /// The relation tag linking form to its immediate root.
    pub tag: String,
    /// The immediate root, one hop closer to the final root.
    pub root: String,
}

/// Per-form relations discovered during ingestion.
pub type RelationTable = AHashMap<String, Vec<Relation>>;

/// Mapping from each final root to every triple that reduces to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordTree {
    map: AHashMap<String, Vec<Triple>>,
}

impl WordTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        WordTree::default()
    }

    pub(crate) fn from_map(map: AHashMap<String, Vec<Triple>>) -> Self {
        WordTree { map }
    }

    /// All triples reducing to `root`, if `root` is a known final root.
    pub fn get(&self, root: &str) -> Option<&[Triple]> {
        self.map.get(root).map(|v| v.as_slice())
    }

    /// Whether `word` is itself a final root.
    pub fn contains_root(&self, word: &str) -> bool {
        self.map.contains_key(word)
    }

    /// Iterate over all final roots.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|s| s.as_str())
    }

    /// Number of final roots.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the tree has no roots.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Persist the tree as sorted rows of fixed-arity triples.
    pub fn save(&self, path: &Path, format: ArtifactFormat) -> Result<()> {
        let rows = sorted_rows(&self.map);
        write_rows(path, format, &rows)
    }

    /// Reload a tree persisted by [`WordTree::save`].
    pub fn load(path: &Path, format: ArtifactFormat) -> Result<Self> {
        let rows: Vec<(String, Vec<Triple>)> = read_rows(path, format)?;
        Ok(WordTree {
            map: rows.into_iter().collect(),
        })
    }
}

/// Mapping from each form to the distinct final roots it resolves to,
/// in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReverseIndex {
    map: AHashMap<String, Vec<String>>,
}

impl ReverseIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        ReverseIndex::default()
    }

    /// Link `form` to `root`, preserving insertion order and deduplicating.
    pub fn add(&mut self, form: &str, root: &str) {
        let roots = self.map.entry(form.to_string()).or_default();
        if !roots.iter().any(|r| r == root) {
            roots.push(root.to_string());
        }
    }

    /// Candidate final roots for a form.
    pub fn get(&self, form: &str) -> Option<&[String]> {
        self.map.get(form).map(|v| v.as_slice())
    }

    /// Number of indexed forms.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Persist the index as a sorted map.
    pub fn save(&self, path: &Path, format: ArtifactFormat) -> Result<()> {
        let rows = sorted_rows(&self.map);
        write_rows(path, format, &rows)
    }

    /// Reload an index persisted by [`ReverseIndex::save`].
    pub fn load(path: &Path, format: ArtifactFormat) -> Result<Self> {
        let rows: Vec<(String, Vec<String>)> = read_rows(path, format)?;
        Ok(ReverseIndex {
            map: rows.into_iter().collect(),
        })
    }
}

/// Persist a relation table as sorted rows.
pub fn save_relations(table: &RelationTable, path: &Path, format: ArtifactFormat) -> Result<()> {
    let rows = sorted_rows(table);
    write_rows(path, format, &rows)
}

/// Reload a relation table persisted by [`save_relations`].
pub fn load_relations(path: &Path, format: ArtifactFormat) -> Result<RelationTable> {
    let rows: Vec<(String, Vec<Relation>)> = read_rows(path, format)?;
    Ok(rows.into_iter().collect())
}

fn sorted_rows<V: Clone>(map: &AHashMap<String, V>) -> Vec<(String, V)> {
    let ordered: BTreeMap<&String, &V> = map.iter().collect();
    ordered
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn write_rows<T: Serialize>(path: &Path, format: ArtifactFormat, rows: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        ArtifactFormat::Bincode => bincode::serialize_into(&mut writer, rows)?,
        ArtifactFormat::Json => serde_json::to_writer(&mut writer, rows)?,
    }
    let writer = writer
        .into_inner()
        .map_err(|e| RootFreqError::store(format!("failed to flush artifact: {e}")))?;
    writer.sync_all()?;
    Ok(())
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path, format: ArtifactFormat) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RootFreqError::missing_artifact(path.display().to_string())
        } else {
            e.into()
        }
    })?;
    let reader = BufReader::new(file);
    let rows = match format {
        ArtifactFormat::Bincode => bincode::deserialize_from(reader)?,
        ArtifactFormat::Json => serde_json::from_reader(reader)?,
    };
    Ok(rows)
}
