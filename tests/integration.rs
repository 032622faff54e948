use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn reposearch_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("reposearch");
    path
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.org"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let repo = root.join("repo");
    fs::create_dir_all(repo.join("docs")).unwrap();
    git(&repo, &["-c", "init.defaultBranch=main", "init", "-q"]);
    fs::write(
        repo.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n",
    )
    .unwrap();
    fs::write(
        repo.join("docs/beta.txt"),
        "Beta notes about deployment and infrastructure.\n",
    )
    .unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-q", "-m", "initial"]);

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[index]
root = "{}/data"

[routing]
base = "https://code.example.org"

[[projects]]
identifier = "demo"

[[projects.repositories]]
path = "{}/repo"
"#,
        root.display(),
        root.display()
    );
    let config_path = config_dir.join("reposearch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_reposearch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = reposearch_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run reposearch binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_index_then_already_indexed() {
    if !git_available() {
        return;
    }
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_reposearch(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("indexed all to changeset 1: 2 added"), "got: {}", stdout);
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_reposearch(&config_path, &["index", "--project", "demo"]);
    assert!(success);
    assert!(stdout.contains("already indexed (changeset 1)"), "got: {}", stdout);
}

#[test]
fn test_search_prints_locators() {
    if !git_available() {
        return;
    }
    let (_tmp, config_path) = setup_test_env();
    run_reposearch(&config_path, &["index"]);

    let (stdout, stderr, success) =
        run_reposearch(&config_path, &["search", "Rust", "--project", "demo"]);
    assert!(success, "search failed: {}", stderr);
    assert_eq!(
        stdout.trim(),
        "https://code.example.org/projects/demo/repository/revisions/main/entry/alpha.md"
    );

    let (stdout, _, success) = run_reposearch(
        &config_path,
        &["search", "Rust", "deployment", "--project", "demo"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_reposearch(
        &config_path,
        &["search", "Rust", "deployment", "--any", "--project", "demo"],
    );
    assert!(success);
    assert_eq!(stdout.lines().count(), 2);
}

#[test]
fn test_get_document() {
    if !git_available() {
        return;
    }
    let (_tmp, config_path) = setup_test_env();
    run_reposearch(&config_path, &["index"]);

    let uri = "https://code.example.org/projects/demo/repository/revisions/main/entry/docs/beta.txt";
    let (stdout, stderr, success) =
        run_reposearch(&config_path, &["get", uri, "--project", "demo", "--text"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("title: docs/beta.txt"));
    assert!(stdout.contains("content_type: text/plain"));
    assert!(stdout.contains("Beta notes"));

    let (_, _, success) = run_reposearch(&config_path, &["get", "/missing", "--project", "demo"]);
    assert!(!success);
}

#[test]
fn test_history_optimize_and_purge() {
    if !git_available() {
        return;
    }
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, _) = run_reposearch(&config_path, &["history", "--project", "demo"]);
    assert!(stdout.contains("[main]  never indexed"), "got: {}", stdout);

    run_reposearch(&config_path, &["index"]);
    let (stdout, _, success) = run_reposearch(&config_path, &["history", "--project", "demo"]);
    assert!(success);
    assert!(stdout.contains("[main]  changeset 1"), "got: {}", stdout);

    let (stdout, stderr, success) = run_reposearch(&config_path, &["optimize", "--project", "demo"]);
    assert!(success, "optimize failed: {}", stderr);
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_reposearch(&config_path, &["purge", "--project", "demo"]);
    assert!(success);
    assert!(stdout.contains("purged demo"));

    let (stdout, _, _) = run_reposearch(&config_path, &["history", "--project", "demo"]);
    assert!(stdout.contains("never indexed"));

    // Purged index cannot be searched until re-indexed.
    let (_, stderr, success) = run_reposearch(&config_path, &["search", "Rust", "--project", "demo"]);
    assert!(!success);
    assert!(stderr.contains("Open failed"), "got: {}", stderr);
}

#[test]
fn test_unknown_project() {
    if !git_available() {
        return;
    }
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_reposearch(&config_path, &["search", "x", "--project", "nope"]);
    assert!(!success);
    assert!(stderr.contains("Unknown project"));
}
