use serde::{Deserialize, Serialize};

/// Platform a build target produces artifacts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        }
    }
}

/// One platform/architecture combination to build, supplied by configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTarget {
    pub platform: Platform,
    pub arch: String,

    /// vcvarsall selector for Windows targets (e.g. "amd64", "x86").
    /// Selecting the wrong one builds against the wrong compiler ABI.
    #[serde(default)]
    pub vcvars_arch: Option<String>,

    /// Container image for Linux targets
    #[serde(default)]
    pub docker_image: Option<String>,

    /// Artifact filename extensions to collect; platform defaults when empty
    #[serde(default)]
    pub artifact_patterns: Vec<String>,
}

impl BuildTarget {
    pub fn name(&self) -> String {
        format!("{}-{}", self.platform.as_str(), self.arch)
    }
}
