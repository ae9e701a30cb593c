//! Rebuild `rankstats.json` and `gameshistory.json` from exported game
//! reports.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use carnage_bot::populate;
use carnage_bot::store::DataDir;

#[derive(Parser, Debug)]
#[command(version, about = "Rebuild the MLG 4v4 ladder from per-game reports")]
struct Args {
    /// Directory of `*.json` game reports, processed in file-name order.
    #[arg(long, default_value = "stats")]
    stats_dir: PathBuf,

    /// Directory holding `rankstats.json`, `xp_config.json` and `players.json`.
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!(stats_dir = %args.stats_dir.display(), data_dir = %args.data_dir.display(), "starting stats population");

    match populate::populate(&args.stats_dir, &DataDir::new(args.data_dir)) {
        Ok(summary) => info!(
            games = summary.games,
            players = summary.players,
            unmatched = summary.unmatched,
            "done"
        ),
        Err(e) => {
            error!(error = %e, "stats population failed");
            std::process::exit(1);
        }
    }
}
