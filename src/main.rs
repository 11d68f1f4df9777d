use anyhow::Result;
use clap::Parser;
use nightforge::cli::{self, Commands};
use nightforge::{commands, config::Config};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Subprocess mode drops timestamps/levels (the parent re-logs our
    // output with its own) but keeps targets for the nesting hierarchy.
    if cli.sub_process {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
            )
            .with_target(true)
            .without_time()
            .with_level(false)
            .with_ansi(false)
            .init();
    } else {
        let use_color = atty::is(atty::Stream::Stdout);
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
            )
            .with_target(true)
            .with_ansi(use_color)
            .init();
    }

    let mut config = Config::load(&cli.config).await?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }

    let result = match cli.cmd {
        Commands::Run(args) => commands::cmd_run(&config, args).await,
        Commands::Build(args) => commands::cmd_build(&config, args).await,
        Commands::Watch(args) => commands::cmd_watch(&config, args).await,
        Commands::Publish => commands::cmd_publish(&config).await,
        Commands::Status => commands::cmd_status(&config).await,
    };

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
