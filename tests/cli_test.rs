use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use accessify::Config;

/// Working directory holding a `config.yaml` the binary picks up
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.inference.api_key = Some("sk-test-1234".to_string());
    config.cache.directory = Some(dir.path().join("cache"));
    config.audio.ffprobe_path = "accessify-missing-ffprobe".to_string();
    config.save_to(&dir.path().join("config.yaml")).unwrap();

    dir
}

fn accessify(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("accessify").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("ACCESSIFY_API_KEY")
        .env_remove("ACCESSIFY_USER_ID")
        .env_remove("ACCESSIFY_QUOTA_KEY");
    cmd
}

#[test]
fn test_formats_lists_supported_types() {
    let dir = workspace();

    accessify(&dir)
        .arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("audio/mpeg"))
        .stdout(predicate::str::contains("image/webp"))
        .stdout(predicate::str::contains("application/pdf"))
        .stdout(predicate::str::contains("50.0 MB"));
}

#[test]
fn test_config_show_masks_key() {
    let dir = workspace();

    accessify(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****1234"))
        .stdout(predicate::str::contains("sk-test").not());
}

#[test]
fn test_process_missing_file() {
    let dir = workspace();

    accessify(&dir)
        .args(["--quiet", "process", "missing.mp3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read missing.mp3"));
}

#[test]
fn test_process_rejects_unsupported_file() {
    let dir = workspace();
    std::fs::write(dir.path().join("notes.txt"), "plain text").unwrap();

    accessify(&dir)
        .args(["--quiet", "process", "notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file type"));
}

#[test]
fn test_process_rejects_oversized_file() {
    let dir = workspace();
    let file = std::fs::File::create(dir.path().join("huge.pdf")).unwrap();
    file.set_len(accessify::content::MAX_FILE_SIZE + 1).unwrap();

    accessify(&dir)
        .args(["--quiet", "process", "huge.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File size exceeds limit"));
}

#[test]
fn test_cache_clear_removes_entries() {
    let dir = workspace();
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&cache_dir).unwrap();
    std::fs::write(cache_dir.join("a.json"), "{}").unwrap();
    std::fs::write(cache_dir.join("b.json"), "{}").unwrap();

    accessify(&dir)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 cached result(s)"));

    assert!(!cache_dir.join("a.json").exists());
}

#[test]
fn test_quota_requires_store() {
    let dir = workspace();

    accessify(&dir)
        .args(["quota", "--user", "user-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No quota store configured"));
}
