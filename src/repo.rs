//! Source checkout management via the git CLI.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use crate::process::{run, RunSpec};

/// Clone or update the working tree and check out the requested revision
/// (or the tip of the configured branch). Returns the resolved commit hash.
pub async fn ensure_checkout(
    url: &str,
    branch: &str,
    revision: Option<&str>,
    dir: &Path,
) -> Result<String> {
    if dir.join(".git").exists() {
        info!(target: "repo", dir = %dir.display(), "updating existing checkout");
        run(&RunSpec::new("git", ["fetch", "origin"]).cwd(dir))
            .await
            .context("fetching origin")?;
    } else {
        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        info!(target: "repo", url = %url, dir = %dir.display(), "cloning repository");
        run(&RunSpec::new(
            "git",
            vec![
                "clone".to_string(),
                "--branch".to_string(),
                branch.to_string(),
                url.to_string(),
                dir.display().to_string(),
            ],
        ))
        .await
        .context("cloning repository")?;
    }

    let want = match revision {
        Some(rev) => rev.to_string(),
        None => format!("origin/{}", branch),
    };
    run(&RunSpec::new("git", vec!["checkout".to_string(), want.clone()]).cwd(dir))
        .await
        .with_context(|| format!("checking out {}", want))?;

    // Stale build outputs from a previous cycle must not leak into this one.
    run(&RunSpec::new("git", ["clean", "-fdx"]).cwd(dir))
        .await
        .context("cleaning working tree")?;

    let out = run(&RunSpec::new("git", ["rev-parse", "HEAD"]).cwd(dir))
        .await
        .context("resolving HEAD")?;
    let commit = out.output.trim().to_string();
    if commit.is_empty() {
        bail!("git rev-parse produced no output in {}", dir.display());
    }

    info!(target: "repo", commit = %commit, "checkout ready");
    Ok(commit)
}

/// Commit hash at the tip of the remote branch, without touching the checkout
pub async fn remote_head(url: &str, branch: &str) -> Result<String> {
    let refspec = format!("refs/heads/{}", branch);
    let out = run(&RunSpec::new(
        "git",
        vec!["ls-remote".to_string(), url.to_string(), refspec.clone()],
    ))
    .await
    .with_context(|| format!("querying {} for {}", url, refspec))?;

    match out.output.split_whitespace().next() {
        Some(commit) => Ok(commit.to_string()),
        None => bail!("no {} on {}", refspec, url),
    }
}

/// First 7 characters of a commit hash, for stamps and log lines
pub fn short_commit(commit: &str) -> &str {
    &commit[..commit.len().min(7)]
}
