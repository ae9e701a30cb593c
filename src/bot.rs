//! Core bot infrastructure: state, gateway bridge, and the event loop.
//!
//! Events are handled one at a time, so handlers get `&mut BotState` and
//! the matchmaking state needs no locking.

use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, trace, warn};

use crate::config::BotConfig;
use crate::error::StoreError;
use crate::events::GatewayEvent;
use crate::gateway::{self, GatewayConfig, INTENT_GUILDS};
use crate::handlers;
use crate::http::DiscordHttpClient;
use crate::matchmaking::Matchmaking;
use crate::store::DataDir;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("failed to load match data: {0}")]
    Store(#[from] StoreError),

    #[error("gateway driver stopped unexpectedly: {0}")]
    Driver(#[from] tokio::task::JoinError),
}

/// Bot identity, configuration and the live matchmaking state.
pub struct BotState {
    pub config: BotConfig,
    pub matchmaking: Matchmaking,
    /// The bot's own user ID (set on READY).
    pub bot_user_id: Option<String>,
    /// The application ID (set on READY).
    pub application_id: Option<String>,
    /// Whether slash commands have been registered this process.
    pub commands_registered: bool,
    pub start_time: Instant,
}

impl BotState {
    pub fn new(config: BotConfig, matchmaking: Matchmaking) -> Self {
        Self {
            config,
            matchmaking,
            bot_user_id: None,
            application_id: None,
            commands_registered: false,
            start_time: Instant::now(),
        }
    }
}

/// Interactions arrive regardless of intents; GUILDS is all the bot needs.
fn gateway_intents() -> u32 {
    INTENT_GUILDS
}

/// Load the stores, connect to the gateway and handle events until the
/// connection is closed for good.
pub async fn run(config: BotConfig) -> Result<(), BotError> {
    let matchmaking = Matchmaking::open(DataDir::new(&config.data_dir))?;
    let http = DiscordHttpClient::new(&config.token);
    let gateway_config = GatewayConfig {
        token: config.token.clone(),
        intents: gateway_intents(),
    };
    let mut state = BotState::new(config, matchmaking);

    let mut gw = gateway::connect(gateway_config);
    info!("gateway started, entering event loop");

    while let Some(event) = gw.events.recv().await {
        match event {
            GatewayEvent::Ready(ready) => handlers::on_ready(&mut state, &http, ready).await,
            GatewayEvent::Resumed => info!("session resumed"),
            GatewayEvent::InteractionCreate(interaction) => {
                if let Err(e) = handlers::on_interaction(&mut state, &http, &interaction).await {
                    error!(error = %e, interaction_id = %interaction.id, "failed to handle interaction");
                }
            }
            GatewayEvent::Unknown {
                event_name: Some(name),
                ..
            } => trace!(event = %name, "unhandled gateway event"),
            _ => {}
        }
    }

    warn!(
        uptime_s = state.start_time.elapsed().as_secs(),
        "event stream ended, bot shutting down"
    );
    gw.driver.await?;
    Ok(())
}
