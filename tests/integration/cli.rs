//! Integration tests for the `gfxreplay` binary

use super::common::fixtures::{capture_bytes, frame_capture};
use assert_cmd::Command;
use gfxreplay::capture::{decode_atoms, DEFAULT_MAX_FRAME_SIZE};
use gfxreplay::AtomId;
use predicates::prelude::*;
use tempfile::TempDir;

fn gfxreplay(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gfxreplay").expect("binary built");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    gfxreplay(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("transform"));
}

#[test]
fn test_transform_rewrites_capture_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.gfx");
    let output = dir.path().join("out.gfx");
    std::fs::write(&input, capture_bytes(&frame_capture(3, false))).unwrap();

    gfxreplay(&dir)
        .arg("transform")
        .arg(&input)
        .arg(&output)
        .args(["--undefined-framebuffer", "--stop-after", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("17 atoms in"));

    let atoms = decode_atoms(&std::fs::read(&output).unwrap(), DEFAULT_MAX_FRAME_SIZE).unwrap();
    assert_eq!(atoms.last().map(|(id, _)| *id), Some(AtomId(6)));
    assert!(atoms.iter().any(|(id, _)| id.is_none()));

    // The first run wrote a default config and a log file.
    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("logs").join("gfxreplay.log").exists());
}

#[test]
fn test_transform_reports_missing_input() {
    let dir = TempDir::new().unwrap();
    gfxreplay(&dir)
        .arg("transform")
        .arg(dir.path().join("missing.gfx"))
        .arg(dir.path().join("out.gfx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("open capture"));
}

#[test]
fn test_transform_rejects_corrupt_capture() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.gfx");
    std::fs::write(&input, [4u8, 0, 0, 0, b'n', b'o', b'p', b'e']).unwrap();

    gfxreplay(&dir)
        .arg("transform")
        .arg(&input)
        .arg(dir.path().join("out.gfx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass aborted"));
}
