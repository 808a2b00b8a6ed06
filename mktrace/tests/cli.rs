// SPDX-License-Identifier: GPL-3.0-or-later

use assert_cmd::Command;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn mktrace() -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mktrace")?;
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

fn write_config(directory: &Path, program: &str) -> Result<String, Box<dyn Error>> {
    let path = directory.join("test.yml");
    fs::write(&path, format!("schema: \"1.0\"\nmake:\n  program: \"{program}\"\n"))?;
    Ok(path.to_string_lossy().into_owned())
}

#[test]
fn test_help() -> Result<(), Box<dyn Error>> {
    mktrace()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: mktrace"))
        .stdout(predicate::str::contains("configure"))
        .stdout(predicate::str::contains("resolve-launch"));
    Ok(())
}

#[test]
fn test_missing_subcommand_fails() -> Result<(), Box<dyn Error>> {
    mktrace()?.arg("-v").assert().failure();
    Ok(())
}

#[test]
fn test_resolve_launch_prints_json() -> Result<(), Box<dyn Error>> {
    mktrace()?
        .args(["resolve-launch", "/w>out/app(--fast,-n)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"binaryPath\": \"/w/out/app\""))
        .stdout(predicate::str::contains("\"workingDirectory\": \"/w\""))
        .stdout(predicate::str::contains("\"--fast\""));
    Ok(())
}

#[test]
fn test_resolve_launch_rejects_malformed_target() -> Result<(), Box<dyn Error>> {
    mktrace()?.args(["resolve-launch", "no separator"]).assert().failure();
    Ok(())
}

#[test]
fn test_targets_without_state() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;

    mktrace()?
        .current_dir(work_dir.path())
        .args(["targets", "-C", "."])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    Ok(())
}

#[test]
fn test_configure_rejects_missing_directory() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;

    mktrace()?
        .current_dir(work_dir.path())
        .args(["configure", "-C", "does-not-exist"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_configure_with_missing_make_fails() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let config = write_config(work_dir.path(), "/nonexistent/bin/make")?;

    mktrace()?
        .current_dir(work_dir.path())
        .args(["-c", &config, "configure", "--clean"])
        .assert()
        .code(1);
    Ok(())
}

#[test]
#[cfg(unix)]
fn test_configure_from_build_log() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    // The database dump runs `true`, which prints no targets.
    let config = write_config(work_dir.path(), "true")?;
    fs::write(
        work_dir.path().join("build.log"),
        "make: Entering directory 'src'\ngcc -DNDEBUG -Iinclude -std=c11 -c lib.c -o lib.o\nmake: Leaving directory 'src'\n",
    )?;

    mktrace()?
        .current_dir(work_dir.path())
        .args(["-c", &config, "configure", "--clean", "--log", "build.log"])
        .assert()
        .success();

    let configuration = fs::read_to_string(work_dir.path().join(".mktrace/configuration.json"))?;
    assert!(configuration.contains("lib.c"));
    assert!(configuration.contains("NDEBUG"));
    assert!(work_dir.path().join(".mktrace/cache.json").exists());

    mktrace()?
        .current_dir(work_dir.path())
        .args(["-c", &config, "launch-targets"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    Ok(())
}
