//! Scheduled polling: build when the remote branch moves.

use anyhow::Result;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::cli::WatchArgs;
use crate::commands::build::run_cycle;
use crate::config::Config;
use crate::paths;
use crate::repo;
use crate::state::StateManager;

pub async fn cmd_watch(config: &Config, args: WatchArgs) -> Result<()> {
    let mut ticker = interval(Duration::from_secs(args.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(target: "watch", interval_secs = args.interval_secs, "watching for changes");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed cycle is retried on the next scheduled poll, not
                // immediately; the error has already been logged in full.
                if let Err(e) = poll_once(config).await {
                    error!(target: "watch", "cycle failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(target: "watch", "interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

async fn poll_once(config: &Config) -> Result<()> {
    let head = repo::remote_head(&config.repo.url, &config.repo.branch).await?;

    let state_manager = StateManager::new(paths::state_dir(&config.base_dir));
    state_manager.init().await?;
    let state = state_manager.load().await?;

    if state.building {
        info!(target: "watch", "cycle already in flight, skipping poll");
        return Ok(());
    }

    let up_to_date = !config.targets.is_empty()
        && config.targets.iter().all(|t| state.built(&t.name(), &head));
    if up_to_date {
        debug!(target: "watch", head = %head, "no change since last build");
        return Ok(());
    }

    info!(target: "watch", head = %head, "change detected, starting cycle");
    run_cycle(config, Some(&head), true).await
}
