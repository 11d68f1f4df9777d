use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

use super::types::OrchestratorState;

const STATE_FILE: &str = "orchestrator.json";

/// Persists orchestrator state as a single JSON document
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir)
            .await
            .context("creating state directory")?;
        Ok(())
    }

    /// Load persisted state, or the default on first run
    pub async fn load(&self) -> Result<OrchestratorState> {
        let state_file = self.state_dir.join(STATE_FILE);
        if !state_file.exists() {
            return Ok(OrchestratorState::default());
        }
        let state_json = fs::read_to_string(&state_file)
            .await
            .context("reading orchestrator state")?;
        let state = serde_json::from_str(&state_json).context("parsing orchestrator state")?;
        Ok(state)
    }

    pub async fn save(&self, state: &OrchestratorState) -> Result<()> {
        let state_file = self.state_dir.join(STATE_FILE);
        let state_json = serde_json::to_string_pretty(state)?;
        fs::write(&state_file, state_json)
            .await
            .context("writing orchestrator state")?;
        Ok(())
    }
}
