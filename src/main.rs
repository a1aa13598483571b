//! gamegate CLI - cached, rate-limited access to a game-data API

use clap::Parser;
use log::LevelFilter;

mod cli;

use cli::{CacheCommands, Cli, Commands, DedupCommands};
use gamegate::error::{Error, Result};

/// Exit code for `dedup check` on an unmarked item
const EXIT_NOT_MARKED: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_NOT_MARKED),
        Err(err) => {
            report(&err);
            std::process::exit(1);
        }
    }
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

/// Upstream failures print the upstream's own message, then its status
fn report(err: &Error) {
    eprintln!("Error: {}", err);
    if let Some(upstream) = err.as_upstream() {
        if upstream.retries_exhausted {
            eprintln!("  upstream {} ({}), retries exhausted", upstream.status, upstream.kind);
        } else {
            eprintln!("  upstream {} ({})", upstream.status, upstream.kind);
        }
    }
}

/// Run the command; `Ok(false)` only for a negative `dedup check`
async fn run(cli: Cli) -> Result<bool> {
    let config = cli.config.as_deref();
    let format = cli.format;

    match cli.command {
        Commands::Fetch {
            resource_type,
            region,
            path,
            params,
            refresh,
        } => {
            cli::fetch::run(&resource_type, &region, &path, &params, refresh, format, config).await?;
        }
        Commands::Dedup(DedupCommands::Mark { set, id }) => {
            cli::dedup::mark(&set, &id, format, config).await?;
        }
        Commands::Dedup(DedupCommands::Check { set, id }) => {
            return cli::dedup::check(&set, &id, format, config).await;
        }
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Stats => cli::cache::stats(format, config)?,
            CacheCommands::Purge => cli::cache::purge(format, config)?,
            CacheCommands::Path => cli::cache::path(config)?,
        },
    }
    Ok(true)
}
