use std::fs;
use tempfile::TempDir;

use nightforge::artifacts;
use nightforge::publish;

fn touch(path: &std::path::Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"artifact bytes").unwrap();
}

#[test]
fn test_collect_matches_patterns_recursively() {
    let dist = TempDir::new().unwrap();
    touch(&dist.path().join("Setup.exe"));
    touch(&dist.path().join("app-full.nupkg"));
    touch(&dist.path().join("unpacked/app.dll"));
    touch(&dist.path().join("builder-debug.yml"));

    let patterns = vec!["exe".to_string(), "nupkg".to_string()];
    let found = artifacts::collect(dist.path(), &patterns);
    let names: Vec<String> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names, vec!["Setup.exe", "app-full.nupkg"]);
}

#[test]
fn test_collect_is_case_insensitive() {
    let dist = TempDir::new().unwrap();
    touch(&dist.path().join("app.AppImage"));

    let patterns = vec!["appimage".to_string()];
    assert_eq!(artifacts::collect(dist.path(), &patterns).len(), 1);
}

#[tokio::test]
async fn test_stage_renames_into_stamp_directory() {
    let dist = TempDir::new().unwrap();
    let publish = TempDir::new().unwrap();
    touch(&dist.path().join("Setup.exe"));

    let found = artifacts::collect(dist.path(), &["exe".to_string()]);
    let staged = artifacts::stage(
        &found,
        publish.path(),
        "shipit",
        "2026-08-06-0123456",
        "windows-x64",
    )
    .await
    .unwrap();

    assert_eq!(staged.len(), 1);
    let expected = publish
        .path()
        .join("2026-08-06-0123456")
        .join("shipit-windows-x64-Setup.exe");
    assert!(expected.exists());
    assert_eq!(staged[0], expected);
}

#[tokio::test]
async fn test_prune_removes_oldest_stamps() {
    let nightly = TempDir::new().unwrap();
    for stamp in [
        "2026-08-01-aaaaaaa",
        "2026-08-02-bbbbbbb",
        "2026-08-03-ccccccc",
        "2026-08-04-ddddddd",
    ] {
        touch(&nightly.path().join(stamp).join("file.exe"));
    }

    let removed = publish::prune(nightly.path(), 2).await.unwrap();
    assert_eq!(
        removed,
        vec!["2026-08-01-aaaaaaa".to_string(), "2026-08-02-bbbbbbb".to_string()]
    );
    assert!(!nightly.path().join("2026-08-01-aaaaaaa").exists());
    assert!(nightly.path().join("2026-08-04-ddddddd").exists());
}

#[tokio::test]
async fn test_prune_missing_directory_is_noop() {
    let base = TempDir::new().unwrap();
    let removed = publish::prune(&base.path().join("does-not-exist"), 3)
        .await
        .unwrap();
    assert!(removed.is_empty());
}
