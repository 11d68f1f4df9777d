//! Build-cycle orchestration: sequential targets, first failure aborts the
//! remaining queue so the mirror never carries a partial artifact set.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::artifacts;
use crate::cli::{BuildArgs, RunArgs};
use crate::config::Config;
use crate::paths;
use crate::publish;
use crate::repo;
use crate::report::Reporter;
use crate::runner;
use crate::state::{BuildStatus, StateManager};
use crate::types::BuildTarget;

pub async fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
    run_cycle(config, args.revision.as_deref(), !args.no_publish).await
}

pub async fn cmd_build(config: &Config, args: BuildArgs) -> Result<()> {
    let target = config
        .target(&args.target)
        .with_context(|| format!("no such target: {}", args.target))?
        .clone();

    let checkout = paths::checkout_dir(&config.base_dir);
    let commit = repo::ensure_checkout(
        &config.repo.url,
        &config.repo.branch,
        args.revision.as_deref(),
        &checkout,
    )
    .await
    .context("preparing source checkout")?;

    let stamp = artifacts::stamp(Utc::now(), &commit);
    let staged = build_one(config, &target, &checkout, &commit, &stamp).await?;
    info!(target: "build", count = staged.len(), "artifacts staged");
    Ok(())
}

/// One full cycle: checkout, build every target in order, publish.
///
/// The in-flight flag and per-target results live in the persisted
/// orchestrator state; both are written back even when the cycle fails.
pub async fn run_cycle(config: &Config, revision: Option<&str>, do_publish: bool) -> Result<()> {
    let state_manager = StateManager::new(paths::state_dir(&config.base_dir));
    state_manager.init().await?;

    let mut state = state_manager.load().await?;
    if state.building {
        bail!("a build cycle is already in flight");
    }
    state.building = true;
    state_manager.save(&state).await?;

    let result = cycle_inner(config, revision, do_publish, &mut state).await;

    state.building = false;
    state.last_poll = Some(Utc::now());
    state_manager.save(&state).await?;

    result
}

async fn cycle_inner(
    config: &Config,
    revision: Option<&str>,
    do_publish: bool,
    state: &mut crate::state::OrchestratorState,
) -> Result<()> {
    let checkout = paths::checkout_dir(&config.base_dir);
    let commit = repo::ensure_checkout(&config.repo.url, &config.repo.branch, revision, &checkout)
        .await
        .context("preparing source checkout")?;

    let stamp = artifacts::stamp(Utc::now(), &commit);
    let reporter = Reporter::thread(stamp.clone());
    reporter.post(&format!(
        "nightly {} starting at {}",
        stamp,
        repo::short_commit(&commit)
    ));

    for target in &config.targets {
        let name = target.name();
        if state.built(&name, &commit) {
            info!(target: "build", target_name = %name, "already built this commit, skipping");
            continue;
        }

        info!(target: "build", target_name = %name, commit = %commit, "building target");
        match build_one(config, target, &checkout, &commit, &stamp).await {
            Ok(staged) => {
                state.record(&name, &commit, BuildStatus::Succeeded);
                reporter.post(&format!("{}: ok ({} artifacts)", name, staged.len()));
            }
            Err(e) => {
                state.record(&name, &commit, BuildStatus::Failed);
                // The captured build output rides along in the error chain;
                // log it here so the failure can be diagnosed offline.
                error!(target: "build", target_name = %name, "build failed: {:#}", e);
                reporter.post(&format!("{}: FAILED, aborting remaining targets", name));
                return Err(e.context(format!("building {}", name)));
            }
        }
    }

    if do_publish {
        publish::sync(&paths::publish_dir(&config.base_dir), &config.publish).await?;
        let pruned = publish::prune(
            &paths::nightly_dir(&config.base_dir),
            config.publish.retention,
        )
        .await?;
        if !pruned.is_empty() {
            reporter.post(&format!("pruned {} old nightlies", pruned.len()));
        }
    }

    reporter.post(&format!("nightly {} complete", stamp));
    Ok(())
}

async fn build_one(
    config: &Config,
    target: &BuildTarget,
    checkout: &Path,
    commit: &str,
    stamp: &str,
) -> Result<Vec<PathBuf>> {
    let dist = runner::build_target(config, target, checkout, commit).await?;

    let patterns = if target.artifact_patterns.is_empty() {
        artifacts::default_patterns(target.platform)
    } else {
        target.artifact_patterns.clone()
    };

    let found = artifacts::collect(&dist, &patterns);
    if found.is_empty() {
        bail!(
            "build produced no artifacts matching {:?} in {}",
            patterns,
            dist.display()
        );
    }

    artifacts::stage(
        &found,
        &paths::nightly_dir(&config.base_dir),
        &config.product,
        stamp,
        &target.name(),
    )
    .await
}
