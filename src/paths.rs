use std::path::{Path, PathBuf};

/// Directory for orchestrator state files
pub fn state_dir(base: &Path) -> PathBuf {
    base.join("state")
}

/// Working tree of the source repository
pub fn checkout_dir(base: &Path) -> PathBuf {
    base.join("checkout")
}

/// Host directory shared with the Windows build VM
pub fn win_share_dir(base: &Path) -> PathBuf {
    base.join("win-share")
}

/// Local tree mirrored to the distribution host
pub fn publish_dir(base: &Path) -> PathBuf {
    base.join("publish")
}

/// Nightly artifact area inside the publish tree, one directory per stamp
pub fn nightly_dir(base: &Path) -> PathBuf {
    publish_dir(base).join("nightly")
}
