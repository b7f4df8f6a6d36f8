//! Concurrency tests for the pillbox binary.
//!
//! These tests verify that multiple processes can safely:
//! - Race to record the same slot (exactly one wins)
//! - Record different slots at the same time
//! - Read while others write

use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use tempfile::TempDir;

const MED: &str = "00000000-0000-0000-0000-000000000001";
const AT: &str = "2024-01-15T08:30:00Z";

fn bin_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("pillbox").to_path_buf()
}

fn setup_test_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join("config.toml"), "").expect("Failed to write config");
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(bin_path())
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--data-dir")
        .arg(dir.join("data"))
        .arg("--user")
        .arg("alice")
        .args(args)
        .output()
        .expect("Failed to run pillbox")
}

fn ledger_lines(dir: &Path) -> usize {
    fs::read_to_string(dir.join("data/ledger/intakes-2024-01-15.jsonl"))
        .map(|c| c.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}

fn add_med(dir: &Path) {
    Command::new(bin_path())
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--data-dir")
        .arg(dir.join("data"))
        .arg("--user")
        .arg("alice")
        .args(["med", "add", "Aspirin", "--id", MED])
        .assert()
        .success();
}

#[test]
fn test_concurrent_take_same_slot_records_once() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path().to_path_buf();
    add_med(&dir);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dir = dir.clone();
            thread::spawn(move || run(&dir, &["--at", AT, "take", MED, "morning"]))
        })
        .collect();

    let outputs: Vec<Output> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = outputs.iter().filter(|o| o.status.success()).count();
    let conflicts = outputs
        .iter()
        .filter(|o| o.status.code() == Some(2))
        .count();

    assert_eq!(successes, 1, "exactly one take should win");
    assert_eq!(conflicts, 7, "every other take should be rejected");
    assert_eq!(ledger_lines(&dir), 1);
}

#[test]
fn test_concurrent_take_different_slots() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path().to_path_buf();
    add_med(&dir);

    let handles: Vec<_> = ["morning", "lunch", "evening"]
        .into_iter()
        .map(|slot| {
            let dir = dir.clone();
            thread::spawn(move || run(&dir, &["--at", AT, "take", MED, slot]))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().status.success());
    }
    assert_eq!(ledger_lines(&dir), 3);
}

#[test]
fn test_reads_during_writes() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path().to_path_buf();
    add_med(&dir);

    let writer_dir = dir.clone();
    let writer = thread::spawn(move || {
        for slot in ["morning", "lunch", "evening"] {
            let out = run(&writer_dir, &["--at", AT, "take", MED, slot]);
            assert!(out.status.success());
            let out = run(&writer_dir, &["--at", AT, "undo", MED, slot]);
            assert!(out.status.success());
        }
    });

    for _ in 0..5 {
        let out = run(&dir, &["--at", AT, "today"]);
        assert!(out.status.success());
        let out = run(&dir, &["--at", AT, "calendar", "2024-01-15"]);
        assert!(out.status.success());
    }

    writer.join().unwrap();
    assert_eq!(ledger_lines(&dir), 0);
}
