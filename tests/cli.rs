use std::process::Command;

use temp_dir::TempDir;
use ureglog::{Module, PatchRule};

mod common;

fn ureglog(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ureglog"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ureglog")
}

#[test]
fn missing_folder_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.child("Assets");

    let output = ureglog(&["patch", missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ureglog patch <assets>"));
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_argument_is_a_usage_error() {
    let output = ureglog(&["patch"]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn patch_reports_each_module() {
    let dir = TempDir::new().unwrap();
    let rule = PatchRule::default();
    common::install(dir.path(), &rule);
    let path = common::write(dir.path(), "Assets/Game.bmod", &common::game("Game", 1));
    common::write(dir.path(), "Assets/Tools.bmod", &common::game("Tools", 0));

    let output = ureglog(&["patch", dir.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("Successfully patched {}\n", path.display())
    );
    assert_eq!(
        common::replacements(&Module::read(&path).unwrap(), &rule),
        1
    );
}

#[test]
fn dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    common::install(dir.path(), &PatchRule::default());
    let path = common::write(dir.path(), "Game.bmod", &common::game("Game", 2));
    let before = std::fs::read(&path).unwrap();

    let output = ureglog(&["patch", dir.path().to_str().unwrap(), "--dry-run"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 call site(s)"));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn missing_bridge_is_reported() {
    let dir = TempDir::new().unwrap();
    common::write(dir.path(), "Game.bmod", &common::game("Game", 1));

    let output = ureglog(&["patch", dir.path().to_str().unwrap()]);

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(0));
    assert!(stderr.contains("Fatal error"));
    assert!(stderr.contains(&PatchRule::default().bridge_module));
    assert!(output.stdout.is_empty());
}

#[test]
fn dump_prints_module() {
    let dir = TempDir::new().unwrap();
    let path = common::write(dir.path(), "Game.bmod", &common::game("Game", 1));

    let output = ureglog(&["dump", path.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("RegisterLogCallback"));
}
