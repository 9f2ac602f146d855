//! End-to-end pipeline tests: build, query, resume, rebuild.

use std::fs;
use std::path::{Path, PathBuf};

use rootfreq::lexicon::{Lexicon, LexiconConfig, TotalFreqOptions};
use rootfreq::RootFreqError;

fn write_dump(dir: &Path) -> PathBuf {
    let dump = [
        "<page>",
        "<title>correr</title>",
        "<text>",
        "==Spanish==",
        "===Verb===",
        "{{es-verb}}",
        "to run",
        "</text>",
        "</page>",
        "<page>",
        "<title>corriendo</title>",
        "<text>",
        "==Spanish==",
        "===Verb===",
        "{{gerund of|es|correr}}",
        "</text>",
        "</page>",
        "<page>",
        "<title>maison</title>",
        "<text>",
        "==French==",
        "une maison",
        "</text>",
        "</page>",
    ]
    .join("\n");
    let path = dir.join("dump.xml");
    fs::write(&path, dump).unwrap();
    path
}

fn write_freq(dir: &Path) -> PathBuf {
    let mut freq = String::from("correr 80\ncorriendo 20\n__TOTAL__ 10,000\n");
    for i in 0..10 {
        freq.push_str(&format!("filler{i} 1\n"));
    }
    let path = dir.join("freq.txt");
    fs::write(&path, freq).unwrap();
    path
}

fn config(dir: &Path) -> LexiconConfig {
    let mut config = LexiconConfig::new("es", "Spanish", dir.join("cache"), write_freq(dir));
    config.dump_path = Some(write_dump(dir));
    config.min_dump_bytes = 0;
    config.show_progress = false;
    config
}

#[test]
fn full_build_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let mut lexicon = Lexicon::open(config(dir.path())).unwrap();

    // The French-only article never entered the store.
    assert!(lexicon.lookup_entry("maison").unwrap().is_none());
    assert!(lexicon
        .lookup_entry("correr")
        .unwrap()
        .unwrap()
        .contains("to run"));

    // corriendo resolves to correr; correr is its own root.
    assert_eq!(lexicon.find_root("corriendo").as_deref(), Some("correr"));
    assert_eq!(lexicon.find_root("correr"), None);

    // (80 + 20) / 10,000 × 1e6 = 10,000 fpm across all conjugations.
    let report = lexicon.total_freq("corriendo", &TotalFreqOptions::default());
    assert_eq!(report.root, "correr");
    assert!((report.total_fpm - 10_000.0).abs() < 1e-6);

    lexicon.close().unwrap();
}

#[test]
fn reverse_index_contains_every_related_form() {
    let dir = tempfile::tempdir().unwrap();
    let lexicon = Lexicon::open(config(dir.path())).unwrap();

    let roots = lexicon.reverse_index().get("corriendo").unwrap();
    assert!(roots.contains(&"correr".to_string()));
    // A root never appears in the reverse index as needing resolution.
    assert!(lexicon.reverse_index().get("correr").is_none());
}

#[test]
fn second_open_skips_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let first = config(dir.path());
    let dump_path = first.dump_path.clone().unwrap();
    drop(Lexicon::open(first).unwrap());

    // Remove the dump entirely: a resumed open must not need it.
    fs::remove_file(&dump_path).unwrap();
    let mut resumed = config(dir.path());
    resumed.dump_path = None;

    let lexicon = Lexicon::open(resumed).unwrap();
    assert_eq!(lexicon.find_root("corriendo").as_deref(), Some("correr"));
}

#[test]
fn restart_between_stages_resumes_at_tree() {
    let dir = tempfile::tempdir().unwrap();
    drop(Lexicon::open(config(dir.path())).unwrap());

    let cache_dir = dir.path().join("cache").join("es");
    // Simulate a crash after the entries stage: tree artifacts gone,
    // state rolled back to entries-only.
    fs::remove_file(cache_dir.join("tree.bin")).unwrap();
    fs::remove_file(cache_dir.join("reverse.bin")).unwrap();
    fs::write(
        cache_dir.join("meta.json"),
        r#"{"entries_finished":true,"tree_finished":false,"format":"bincode"}"#,
    )
    .unwrap();

    let mut resumed = config(dir.path());
    resumed.dump_path = None; // ingestion must not rerun
    let lexicon = Lexicon::open(resumed).unwrap();
    assert_eq!(lexicon.find_root("corriendo").as_deref(), Some("correr"));
}

#[test]
fn missing_tree_artifact_triggers_tree_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    drop(Lexicon::open(config(dir.path())).unwrap());

    let cache_dir = dir.path().join("cache").join("es");
    fs::remove_file(cache_dir.join("tree.bin")).unwrap();

    let mut resumed = config(dir.path());
    resumed.dump_path = None;
    let lexicon = Lexicon::open(resumed).unwrap();
    assert_eq!(lexicon.find_root("corriendo").as_deref(), Some("correr"));
}

#[test]
fn missing_store_without_dump_fails() {
    let dir = tempfile::tempdir().unwrap();
    drop(Lexicon::open(config(dir.path())).unwrap());

    let cache_dir = dir.path().join("cache").join("es");
    fs::remove_file(cache_dir.join("entries.log")).unwrap();

    let mut resumed = config(dir.path());
    resumed.dump_path = None;
    let result = Lexicon::open(resumed);
    assert!(matches!(result, Err(RootFreqError::MissingArtifact(_))));
}

#[test]
fn rebuild_produces_identical_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    drop(Lexicon::open(config(dir.path())).unwrap());

    let cache_dir = dir.path().join("cache").join("es");
    let tree_before = fs::read(cache_dir.join("tree.bin")).unwrap();
    let reverse_before = fs::read(cache_dir.join("reverse.bin")).unwrap();

    let mut again = config(dir.path());
    again.dump_path = None;
    again.force_tree_rebuild = true;
    drop(Lexicon::open(again).unwrap());

    assert_eq!(fs::read(cache_dir.join("tree.bin")).unwrap(), tree_before);
    assert_eq!(
        fs::read(cache_dir.join("reverse.bin")).unwrap(),
        reverse_before
    );
}

#[test]
fn full_reingest_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    drop(Lexicon::open(config(dir.path())).unwrap());

    let cache_dir = dir.path().join("cache").join("es");
    let log_before = fs::read(cache_dir.join("entries.log")).unwrap();
    let roots_before = fs::read(cache_dir.join("roots.bin")).unwrap();

    // Force a full rebuild by clearing the state descriptor.
    fs::remove_file(cache_dir.join("meta.json")).unwrap();
    drop(Lexicon::open(config(dir.path())).unwrap());

    assert_eq!(fs::read(cache_dir.join("entries.log")).unwrap(), log_before);
    assert_eq!(fs::read(cache_dir.join("roots.bin")).unwrap(), roots_before);
}

#[test]
fn reingest_rebuilds_spelling_index() {
    let dir = tempfile::tempdir().unwrap();
    let dump = [
        "<title>está</title>",
        "==Spanish==",
        "is",
        "<title>correr</title>",
        "==Spanish==",
        "to run",
    ]
    .join("\n");
    let dump_path = dir.path().join("dump.xml");
    fs::write(&dump_path, dump).unwrap();

    let mut cfg = LexiconConfig::new("es", "Spanish", dir.path().join("cache"), write_freq(dir.path()));
    cfg.dump_path = Some(dump_path.clone());
    cfg.min_dump_bytes = 0;
    cfg.show_progress = false;

    let lexicon = Lexicon::open(cfg.clone()).unwrap();
    assert_eq!(lexicon.check_spelling("esta"), "está");
    drop(lexicon);

    // Rebuild from a dump that no longer carries the accented word: the
    // cached spelling index must not survive the re-ingestion.
    let smaller = ["<title>correr</title>", "==Spanish==", "to run"].join("\n");
    fs::write(&dump_path, smaller).unwrap();
    fs::remove_file(dir.path().join("cache").join("es").join("meta.json")).unwrap();

    let lexicon = Lexicon::open(cfg).unwrap();
    assert_eq!(lexicon.check_spelling("esta"), "esta");
}

#[test]
fn json_artifacts_also_work() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.format = rootfreq::tree::ArtifactFormat::Json;
    let lexicon = Lexicon::open(cfg).unwrap();

    let cache_dir = dir.path().join("cache").join("es");
    assert!(cache_dir.join("tree.json").is_file());
    assert!(cache_dir.join("reverse.json").is_file());
    assert_eq!(lexicon.find_root("corriendo").as_deref(), Some("correr"));
}
