use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nightforge", version, about = "Nightly build orchestrator for desktop releases")]
pub struct Cli {
    /// Path to the orchestrator config file
    #[arg(long, default_value = "nightforge.toml")]
    pub config: PathBuf,

    /// Override the base directory from the config
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Reduced log formatting for when output is captured by a parent process
    #[arg(long, hide = true)]
    pub sub_process: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one full build cycle over all configured targets
    Run(RunArgs),
    /// Build a single target
    Build(BuildArgs),
    /// Poll the repository on a schedule and build when it changes
    Watch(WatchArgs),
    /// Sync the publish tree to the mirror and prune old nightlies
    Publish,
    /// Show the last recorded build per target
    Status,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Build this revision instead of the branch tip
    #[arg(long)]
    pub revision: Option<String>,

    /// Skip the publish step after a successful cycle
    #[arg(long)]
    pub no_publish: bool,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Target name, e.g. "windows-x64"
    #[arg(long)]
    pub target: String,

    /// Build this revision instead of the branch tip
    #[arg(long)]
    pub revision: Option<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between repository polls
    #[arg(long, default_value_t = 300)]
    pub interval_secs: u64,
}
