//! Per-platform build runners.

pub mod docker;
pub mod local;
pub mod windows;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::types::{BuildTarget, Platform};

/// Build one target and return the dist directory its artifacts landed in
pub async fn build_target(
    config: &Config,
    target: &BuildTarget,
    checkout: &Path,
    revision: &str,
) -> Result<PathBuf> {
    match target.platform {
        Platform::Windows => windows::build(config, target, revision).await,
        Platform::Linux => docker::build(config, target, checkout).await,
        Platform::Macos => local::build(config, target, checkout).await,
    }
}
