use anyhow::Result;

use crate::config::Config;
use crate::paths;
use crate::repo::short_commit;
use crate::state::{BuildStatus, StateManager};

pub async fn cmd_status(config: &Config) -> Result<()> {
    let state_manager = StateManager::new(paths::state_dir(&config.base_dir));
    let state = state_manager.load().await?;

    if let Some(last_poll) = state.last_poll {
        println!("last cycle: {}", last_poll.to_rfc3339());
    } else {
        println!("no cycles recorded yet");
    }
    if state.building {
        println!("a cycle is currently in flight");
    }

    for target in &config.targets {
        let name = target.name();
        match state.targets.get(&name) {
            Some(record) => {
                let outcome = match record.outcome {
                    BuildStatus::Succeeded => "ok",
                    BuildStatus::Failed => "FAILED",
                };
                println!(
                    "{:<16} {:<8} {} at {}",
                    name,
                    outcome,
                    short_commit(&record.commit),
                    record.finished_at.to_rfc3339()
                );
            }
            None => println!("{:<16} never built", name),
        }
    }
    Ok(())
}
