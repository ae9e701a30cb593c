//! Event handlers for the Discord bot.
//!
//! Each public function handles one category of gateway event. The command
//! logic itself lives in [`crate::commands`]; handlers turn interactions
//! into calls there and send the results back over HTTP.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bot::BotState;
use crate::commands::{self, CommandContext, Reply};
use crate::config::BotConfig;
use crate::http::{DiscordHttpClient, HttpError};
use crate::matchmaking::Matchmaking;
use crate::types::*;

/// Record our identity and register the slash commands (once per process).
///
/// With `GUILD_ID` set, commands are registered on that guild and show up
/// immediately; otherwise they are registered globally.
pub async fn on_ready(state: &mut BotState, http: &DiscordHttpClient, ready: ReadyEvent) {
    info!(user = %ready.user.tag(), guilds = ready.guilds.len(), "bot is ready!");
    state.bot_user_id = Some(ready.user.id);
    state.application_id = Some(ready.application.id.clone());

    if state.commands_registered {
        return;
    }
    let cmds = commands::slash_commands();
    let app_id = &ready.application.id;
    let result = match state.config.guild_id.as_deref() {
        Some(guild_id) => http.bulk_overwrite_guild_commands(app_id, guild_id, &cmds).await,
        None => http.bulk_overwrite_global_commands(app_id, &cmds).await,
    };
    match result {
        Ok(registered) => {
            info!(
                count = registered.len(),
                guild = state.config.guild_id.as_deref().unwrap_or("global"),
                "registered slash commands"
            );
            state.commands_registered = true;
        }
        Err(e) => warn!(error = %e, "failed to register slash commands"),
    }
}

/// Answer an interaction, then post any announcement it produced.
pub async fn on_interaction(
    state: &mut BotState,
    http: &DiscordHttpClient,
    interaction: &Interaction,
) -> Result<(), HttpError> {
    let Some(reply) = build_reply(&mut state.matchmaking, &state.config, interaction, Utc::now()) else {
        return Ok(());
    };
    http.create_interaction_response(&interaction.id, &interaction.token, &reply.response)
        .await?;

    if let Some(message) = &reply.announcement {
        match announcement_channel(&state.config, interaction) {
            Some(channel_id) => {
                http.create_message(channel_id, message).await?;
            }
            None => warn!(interaction_id = %interaction.id, "no channel to announce in"),
        }
    }
    Ok(())
}

/// Work out the reply for `interaction`. `None` means it is not ours to
/// answer.
pub fn build_reply(
    mm: &mut Matchmaking,
    config: &BotConfig,
    interaction: &Interaction,
    now: DateTime<Utc>,
) -> Option<Reply> {
    match interaction.kind {
        InteractionType::Ping => Some(Reply {
            response: InteractionResponse::pong(),
            announcement: None,
        }),
        InteractionType::ApplicationCommand => {
            let data = interaction.data.as_ref()?;
            let name = data.name.as_deref()?;
            let Some(author) = interaction.author() else {
                warn!(command = name, "interaction without a user");
                return None;
            };
            let roles = interaction.member_roles();
            let ctx = CommandContext {
                user_id: &author.id,
                roles,
                is_admin: config.is_admin(roles),
                now,
            };
            info!(command = name, user = %author.tag(), user_id = %author.id, "handling slash command");
            Some(commands::handle_command(mm, &ctx, name, &data.options))
        }
        InteractionType::MessageComponent => {
            let custom_id = interaction.data.as_ref()?.custom_id.as_deref()?;
            let reply = commands::handle_component(mm, custom_id);
            if reply.is_none() {
                warn!(custom_id, "unknown component interaction");
            }
            reply
        }
        _ => None,
    }
}

/// Series announcements go to the queue channel if one is configured,
/// otherwise to the channel the command came from.
pub fn announcement_channel<'a>(config: &'a BotConfig, interaction: &'a Interaction) -> Option<&'a str> {
    config
        .queue_channel_id
        .as_deref()
        .or(interaction.channel_id.as_deref())
}
