use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/kx.sqlite"

[storage]
local_root = "{}/files"

[extraction]
max_attempts = 3
batch_size = 10

[server]
bind = "127.0.0.1:7341"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("kx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/kx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_project_commands_require_project() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_kx(&config_path, &["queue"]);
    assert!(!success);
    assert!(stderr.contains("--project"));
}

#[test]
fn test_website_enqueue_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kx(
        &config_path,
        &["--project", "p1", "website", "https://acme.test"],
    );
    assert!(success, "website failed: {}", stderr);
    assert!(stdout.contains("Queued website extraction for https://acme.test."));

    let (stdout, _, success) = run_kx(
        &config_path,
        &["--project", "p1", "website", "https://acme.test"],
    );
    assert!(success);
    assert!(stdout.contains("already queued"));

    let (stdout, _, success) = run_kx(&config_path, &["--project", "p1", "queue"]);
    assert!(success);
    assert!(stdout.contains("website_content/https://acme.test priority=9 status=pending"));
}

#[test]
fn test_process_reports_outcomes() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_kx(
        &config_path,
        &["--project", "p1", "enqueue", "form_response", "r404"],
    );
    assert!(success, "enqueue failed: {}", stderr);
    run_kx(
        &config_path,
        &["--project", "p1", "website", "https://acme.test"],
    );

    let (stdout, stderr, success) = run_kx(&config_path, &["--project", "p1", "process"]);
    assert!(success, "process failed: {}", stderr);
    assert!(stdout.contains("2 selected, 0 completed, 1 failed, 1 skipped"));

    let (stdout, _, _) = run_kx(&config_path, &["--project", "p1", "queue"]);
    assert!(stdout.contains("form_response/r404 priority=5 status=failed attempts=1"));
    assert!(stdout.contains("not found"));
}

#[test]
fn test_enqueue_unknown_source_type_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_kx(
        &config_path,
        &["--project", "p1", "enqueue", "website", "x"],
    );
    assert!(!success);
}

#[test]
fn test_items_empty_project() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kx(&config_path, &["--project", "p1", "items"]);
    assert!(success, "items failed: {}", stderr);
    assert!(stdout.contains("No knowledge items."));
}

#[test]
fn test_extract_missing_record_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_kx(
        &config_path,
        &["--project", "p1", "extract", "file", "nope"],
    );
    assert!(!success);
    assert!(stderr.contains("file not found: nope"));
}
