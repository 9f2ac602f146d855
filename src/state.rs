//! Resumable build state for the per-language cache.
//!
//! The pipeline has two expensive stages: entry ingestion and tree
//! building. [`BuildState`] records which stages have completed, persisted
//! to `meta.json` in the language's cache directory. The state file is
//! written only after a stage's artifacts are durably flushed, so a crash
//! mid-stage recovers by rerunning that stage; re-ingestion overwrites
//! rather than duplicates. A stage flag is only trusted when the stage's
//! artifacts are verified present by the caller.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::ArtifactFormat;

/// Name of the state descriptor inside a cache directory.
const META_FILE: &str = "meta.json";

/// Persisted two-stage pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    /// Whether entry ingestion completed and the relations artifact exists.
    pub entries_finished: bool,
    /// Whether the tree artifacts were built and persisted.
    pub tree_finished: bool,
    /// Encoding of the cached artifacts.
    #[serde(default)]
    pub format: ArtifactFormat,
}

impl BuildState {
    /// Path of the state descriptor for a cache directory.
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(META_FILE)
    }

    /// Load the state from a cache directory, defaulting to a fresh state
    /// when no descriptor exists yet.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let path = Self::path(cache_dir);
        if !path.is_file() {
            debug!("no build state in {}, starting fresh", cache_dir.display());
            return Ok(BuildState::default());
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Persist the state. Only call after the stage's artifacts are durable.
    pub fn save(&self, cache_dir: &Path) -> Result<()> {
        let path = Self::path(cache_dir);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        file.sync_all()?;
        debug!(
            "saved build state {:?} to {}",
            (self.entries_finished, self.tree_finished),
            path.display()
        );
        Ok(())
    }

    /// Mark the ingestion stage complete.
    pub fn finish_entries(&mut self, cache_dir: &Path) -> Result<()> {
        self.entries_finished = true;
        self.save(cache_dir)
    }

    /// Mark the tree stage complete.
    pub fn finish_tree(&mut self, cache_dir: &Path) -> Result<()> {
        self.tree_finished = true;
        self.save(cache_dir)
    }

    /// Downgrade to "nothing built": a required ingestion artifact is gone.
    pub fn reset(&mut self) {
        info!("build artifacts missing, resetting build state");
        self.entries_finished = false;
        self.tree_finished = false;
    }
}
