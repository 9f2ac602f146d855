//! # rootfreq
//!
//! Builds a persistent word-root index from a wiki-style lexicographic dump
//! and aggregates word frequency across inflected forms.
//!
//! ## Pipeline
//!
//! - Stream the compressed dump once, extracting per-word entries for one
//!   target language into a persistent store, along with the "form of root"
//!   relations found in their markup
//! - Resolve relation chains (cycle-safe) into a forward root→forms tree
//!   and a reverse form→roots index
//! - Load a frequency corpus and answer aggregated frequency-per-million
//!   queries over a word and all of its known forms
//!
//! The whole build is resumable: completed stages are recorded per language
//! and skipped on subsequent runs.

pub mod error;
pub mod frequency;
pub mod ingest;
pub mod lexicon;
pub mod spelling;
pub mod state;
pub mod store;
pub mod tree;

pub use error::{Result, RootFreqError};
pub use lexicon::{FreqReport, FreqRow, Lexicon, LexiconConfig, TotalFreqOptions};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
