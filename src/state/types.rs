use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Orchestrator bookkeeping across cycles.
///
/// Loaded at startup, mutated only by the poll step, persisted after each
/// attempt. This is the single home for what used to be ambient state
/// (last-build files, an in-flight flag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub schema_version: u32,
    /// A cycle is in flight; a second one must not start
    pub building: bool,
    pub last_poll: Option<DateTime<Utc>>,
    /// Last attempt per target name
    pub targets: HashMap<String, TargetRecord>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            building: false,
            last_poll: None,
            targets: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub commit: String,
    pub finished_at: DateTime<Utc>,
    pub outcome: BuildStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Succeeded,
    Failed,
}

impl OrchestratorState {
    pub fn record(&mut self, target: &str, commit: &str, outcome: BuildStatus) {
        self.targets.insert(
            target.to_string(),
            TargetRecord {
                commit: commit.to_string(),
                finished_at: Utc::now(),
                outcome,
            },
        );
    }

    /// Whether the target already built this commit successfully
    pub fn built(&self, target: &str, commit: &str) -> bool {
        self.targets
            .get(target)
            .map(|r| r.commit == commit && r.outcome == BuildStatus::Succeeded)
            .unwrap_or(false)
    }
}
