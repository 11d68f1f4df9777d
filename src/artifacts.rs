//! Collecting build outputs and staging them into the publish tree.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::repo::short_commit;
use crate::types::Platform;

/// Default artifact extensions per platform, used when a target configures none
pub fn default_patterns(platform: Platform) -> Vec<String> {
    let exts: &[&str] = match platform {
        Platform::Windows => &["exe", "msi", "nupkg"],
        Platform::Macos => &["dmg", "zip"],
        Platform::Linux => &["AppImage", "deb", "rpm"],
    };
    exts.iter().map(|e| e.to_string()).collect()
}

/// Nightly stamp: build date plus short commit, e.g. "2026-08-06-0123456".
/// Stamps sort lexicographically in chronological order.
pub fn stamp(now: DateTime<Utc>, commit: &str) -> String {
    format!("{}-{}", now.format("%Y-%m-%d"), short_commit(commit))
}

/// Walk a dist tree and return every file whose extension matches one of
/// the patterns (case-insensitive)
pub fn collect(dist: &Path, patterns: &[String]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dist)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| patterns.iter().any(|p| p.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Copy artifacts into `<nightly_dir>/<stamp>/`, renamed with product and
/// target so files from different targets never collide. Returns the staged
/// paths.
pub async fn stage(
    artifacts: &[PathBuf],
    nightly_dir: &Path,
    product: &str,
    stamp: &str,
    target_name: &str,
) -> Result<Vec<PathBuf>> {
    let dest_dir = nightly_dir.join(stamp);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let mut staged = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("artifact has no usable file name: {}", artifact.display()))?;
        let dest = dest_dir.join(format!("{}-{}-{}", product, target_name, file_name));
        tokio::fs::copy(artifact, &dest)
            .await
            .with_context(|| format!("copying {} to {}", artifact.display(), dest.display()))?;
        info!(target: "artifacts", file = %dest.display(), "staged");
        staged.push(dest);
    }
    Ok(staged)
}
