//! Discord bot entry point.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use carnage_bot::bot;
use carnage_bot::config::BotConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenv::dotenv().ok();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    info!(data_dir = %config.data_dir.display(), "starting carnage bot");

    if let Err(e) = bot::run(config).await {
        error!(error = %e, "bot exited with an error");
        std::process::exit(1);
    }
}
