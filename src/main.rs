use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use quadterrain::commands;
use quadterrain::config::CliArgs;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("quadterrain=debug")
    } else {
        EnvFilter::new("quadterrain=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure rayon thread pool")?;
    }

    commands::run(&args).map_err(|e| {
        error!(%e, "Command failed");
        anyhow::anyhow!(e)
    })
    .context("quadterrain command failed")
}
