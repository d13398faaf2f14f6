//! End-to-end CLI tests: bundle → list → verify → extract (spec.md §8 S2).

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn write_asset(root: &std::path::Path, rel: &str, bytes: &[u8]) {
    let full = root.join(rel);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, bytes).unwrap();
}

#[test]
fn bundle_list_verify_extract_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let source = tempdir()?;
    write_asset(source.path(), "data/config/a.json", b"{\"v\":1}\n");
    write_asset(source.path(), "images/backgrounds/bg1.png", b"fakepngbytes");

    let out_dir = tempdir()?;
    let bundle_path = out_dir.path().join("main.qpk");

    Command::cargo_bin("quackpack")?
        .args(["bundle", source.path().to_str().unwrap(), "-o"])
        .arg(&bundle_path)
        .args(["--bundle-version", "1.0.0"])
        .assert()
        .success();
    assert!(bundle_path.exists());

    Command::cargo_bin("quackpack")?
        .arg("list")
        .arg(&bundle_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("data/config/a.json").and(predicate::str::contains("images/backgrounds/bg1.png")));

    Command::cargo_bin("quackpack")?
        .arg("verify")
        .arg(&bundle_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 assets verified"));

    let extracted = out_dir.path().join("a.json");
    Command::cargo_bin("quackpack")?
        .arg("extract")
        .arg(&bundle_path)
        .arg("data/config/a.json")
        .arg("-o")
        .arg(&extracted)
        .assert()
        .success();
    assert_eq!(fs::read(&extracted)?, b"{\"v\":1}\n");

    Ok(())
}

#[test]
fn bundle_rejects_an_empty_source_directory() -> Result<(), Box<dyn std::error::Error>> {
    let source = tempdir()?;
    let out_dir = tempdir()?;
    let bundle_path = out_dir.path().join("main.qpk");

    Command::cargo_bin("quackpack")?
        .args(["bundle", source.path().to_str().unwrap(), "-o"])
        .arg(&bundle_path)
        .args(["--bundle-version", "1.0.0"])
        .assert()
        .failure();
    assert!(!bundle_path.exists());

    Ok(())
}

#[test]
fn version_info_prints_bundle_version_and_root() -> Result<(), Box<dyn std::error::Error>> {
    let source = tempdir()?;
    write_asset(source.path(), "data/config/a.json", b"{}");
    let out_dir = tempdir()?;
    let bundle_path = out_dir.path().join("main.qpk");

    Command::cargo_bin("quackpack")?
        .args(["bundle", source.path().to_str().unwrap(), "-o"])
        .arg(&bundle_path)
        .args(["--bundle-version", "2.1.0"])
        .assert()
        .success();

    Command::cargo_bin("quackpack")?
        .arg("version-info")
        .arg(&bundle_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("bundle_version: 2.1.0").and(predicate::str::contains("merkle_root:")));

    Ok(())
}
