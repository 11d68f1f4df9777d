//! Mirror synchronization and nightly retention pruning.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::config::PublishConfig;
use crate::process::{run, RunSpec};

/// Sync the local publish tree to the configured mirror(s)
pub async fn sync(publish_dir: &Path, config: &PublishConfig) -> Result<()> {
    let src = format!("{}/", publish_dir.display());

    if let Some(mirror) = &config.mirror {
        info!(target: "publish", mirror = %mirror, "syncing to mirror");
        run(&RunSpec::new(
            "rsync",
            vec!["-az".to_string(), src.clone(), mirror.clone()],
        ))
        .await
        .with_context(|| format!("rsyncing to {}", mirror))?;
    }

    if let Some(bucket) = &config.s3_bucket {
        let dest = format!("s3://{}", bucket);
        info!(target: "publish", bucket = %dest, "syncing to object storage");
        run(&RunSpec::new(
            "aws",
            vec!["s3".to_string(), "sync".to_string(), src, dest.clone()],
        ))
        .await
        .with_context(|| format!("syncing to {}", dest))?;
    }

    if config.mirror.is_none() && config.s3_bucket.is_none() {
        warn!(target: "publish", "no mirror configured, artifacts stay local");
    }

    Ok(())
}

/// Remove nightly stamp directories beyond the retention count, oldest
/// first. Returns the stamps that were removed.
pub async fn prune(nightly_dir: &Path, retention: usize) -> Result<Vec<String>> {
    if !nightly_dir.exists() {
        return Ok(Vec::new());
    }

    let mut stamps = Vec::new();
    let mut entries = tokio::fs::read_dir(nightly_dir)
        .await
        .with_context(|| format!("reading {}", nightly_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                stamps.push(name.to_string());
            }
        }
    }

    let stale = stale_stamps(stamps, retention);
    for stamp in &stale {
        let dir = nightly_dir.join(stamp);
        info!(target: "publish", stamp = %stamp, "pruning nightly");
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("removing {}", dir.display()))?;
    }
    Ok(stale)
}

/// The stamps to remove so that only the newest `retention` remain.
/// Stamps sort lexicographically in chronological order.
fn stale_stamps(mut stamps: Vec<String>, retention: usize) -> Vec<String> {
    if stamps.len() <= retention {
        return Vec::new();
    }
    stamps.sort();
    stamps.truncate(stamps.len() - retention);
    stamps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamps(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_stale_stamps_keeps_newest() {
        let all = stamps(&[
            "2026-08-03-aaaaaaa",
            "2026-08-01-bbbbbbb",
            "2026-08-04-ccccccc",
            "2026-08-02-ddddddd",
        ]);
        let stale = stale_stamps(all, 2);
        assert_eq!(stale, stamps(&["2026-08-01-bbbbbbb", "2026-08-02-ddddddd"]));
    }

    #[test]
    fn test_stale_stamps_under_retention() {
        assert!(stale_stamps(stamps(&["2026-08-01-aaaaaaa"]), 5).is_empty());
        assert!(stale_stamps(Vec::new(), 0).is_empty());
    }

    #[test]
    fn test_stale_stamps_zero_retention_removes_all() {
        let all = stamps(&["2026-08-01-aaaaaaa", "2026-08-02-bbbbbbb"]);
        let stale = stale_stamps(all.clone(), 0);
        let mut sorted = all;
        sorted.sort();
        assert_eq!(stale, sorted);
    }
}
