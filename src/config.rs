//! Orchestrator configuration, loaded from a TOML file.
//!
//! Secrets (guest password, signing-key identifier, pass-through API keys)
//! are referenced by environment-variable name and resolved at build time;
//! they never live in the config file or on disk in the guest.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::BuildTarget;
use crate::windows::DriverTimings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Product name used in artifact file names
    pub product: String,

    /// Base directory for checkouts, state, the VM share, and the publish tree
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    pub repo: RepoConfig,

    #[serde(rename = "target", default)]
    pub targets: Vec<BuildTarget>,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub vm: VmConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Build commands, identical across platforms
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_install_cmd")]
    pub install_cmd: Vec<String>,
    #[serde(default = "default_dist_cmd")]
    pub dist_cmd: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install_cmd: default_install_cmd(),
            dist_cmd: default_dist_cmd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmConfig {
    #[serde(default = "default_vm_name")]
    pub name: String,
    #[serde(default = "default_vm_username")]
    pub username: String,
    /// Environment variable holding the guest password
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_share_name")]
    pub share_name: String,
    /// Drive letter the guest maps the share to
    #[serde(default = "default_drive")]
    pub drive: String,
    #[serde(default = "default_vcvars_path")]
    pub vcvars_path: String,
    #[serde(default = "default_guest_workdir")]
    pub guest_workdir: String,
    /// Environment variable holding the signing-key identifier
    #[serde(default = "default_signing_key_env")]
    pub signing_key_env: String,
    /// Host file copied onto the share for the guest build to pick up
    #[serde(default)]
    pub build_config: Option<PathBuf>,
    /// Host environment variables forwarded into the guest by name
    #[serde(default)]
    pub passthrough_env: Vec<String>,
    /// Literal extra guest environment variables
    #[serde(default)]
    pub guest_env: HashMap<String, String>,
    #[serde(default)]
    pub timings: TimingsConfig,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            name: default_vm_name(),
            username: default_vm_username(),
            password_env: default_password_env(),
            share_name: default_share_name(),
            drive: default_drive(),
            vcvars_path: default_vcvars_path(),
            guest_workdir: default_guest_workdir(),
            signing_key_env: default_signing_key_env(),
            build_config: None,
            passthrough_env: Vec::new(),
            guest_env: HashMap::new(),
            timings: TimingsConfig::default(),
        }
    }
}

/// Driver timing overrides, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimingsConfig {
    #[serde(default = "default_settle_secs")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_boot_poll_secs")]
    pub boot_poll_secs: u64,
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_timeout_secs: u64,
    #[serde(default = "default_map_attempts")]
    pub map_attempts: u32,
    #[serde(default = "default_map_settle_secs")]
    pub map_settle_secs: u64,
    #[serde(default = "default_shutdown_poll_secs")]
    pub shutdown_poll_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_secs(),
            boot_poll_secs: default_boot_poll_secs(),
            boot_timeout_secs: default_boot_timeout_secs(),
            map_attempts: default_map_attempts(),
            map_settle_secs: default_map_settle_secs(),
            shutdown_poll_secs: default_shutdown_poll_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl TimingsConfig {
    pub fn to_driver(&self) -> DriverTimings {
        DriverTimings {
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            boot_poll_interval: Duration::from_secs(self.boot_poll_secs),
            boot_timeout: Duration::from_secs(self.boot_timeout_secs),
            map_attempts: self.map_attempts,
            map_settle: Duration::from_secs(self.map_settle_secs),
            shutdown_poll_interval: Duration::from_secs(self.shutdown_poll_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// rsync destination, e.g. "mirror.example.org:/srv/nightly"
    #[serde(default)]
    pub mirror: Option<String>,
    /// Optional S3 bucket synced with the aws CLI
    #[serde(default)]
    pub s3_bucket: Option<String>,
    /// Nightly stamps to keep when pruning
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            mirror: None,
            s3_bucket: None,
            retention: default_retention(),
        }
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn target(&self, name: &str) -> Option<&BuildTarget> {
        self.targets.iter().find(|t| t.name() == name)
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/lib/nightforge")
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_install_cmd() -> Vec<String> {
    vec!["npm".to_string(), "ci".to_string()]
}

fn default_dist_cmd() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "dist".to_string()]
}

fn default_vm_name() -> String {
    "win-build".to_string()
}

fn default_vm_username() -> String {
    "builder".to_string()
}

fn default_password_env() -> String {
    "NF_VM_PASSWORD".to_string()
}

fn default_share_name() -> String {
    "nightforge".to_string()
}

fn default_drive() -> String {
    "Z:".to_string()
}

fn default_vcvars_path() -> String {
    "C:\\Program Files (x86)\\Microsoft Visual Studio\\2019\\BuildTools\\VC\\Auxiliary\\Build\\vcvarsall.bat"
        .to_string()
}

fn default_guest_workdir() -> String {
    "%USERPROFILE%".to_string()
}

fn default_signing_key_env() -> String {
    "NF_SIGNING_KEY_ID".to_string()
}

fn default_retention() -> usize {
    14
}

fn default_settle_secs() -> u64 {
    5
}

fn default_boot_poll_secs() -> u64 {
    3
}

fn default_boot_timeout_secs() -> u64 {
    90
}

fn default_map_attempts() -> u32 {
    5
}

fn default_map_settle_secs() -> u64 {
    5
}

fn default_shutdown_poll_secs() -> u64 {
    1
}

fn default_shutdown_timeout_secs() -> u64 {
    20
}

fn default_heartbeat_secs() -> u64 {
    60
}
