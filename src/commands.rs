//! Slash-command definitions and dispatch.
//!
//! Everything here is synchronous and transport free: a command comes in as
//! a name plus its options, and goes out as a [`Reply`] the bot sends back
//! over HTTP. That keeps the whole command surface testable against a
//! temporary data directory.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info};

use crate::error::{MatchError, MatchmakingError};
use crate::ladder::rank_icon_url;
use crate::matchmaking::{
    Correction, GameResult, JoinOutcome, Matchmaking, Removal, SeriesEnd, SeriesStart, VoteResult,
};
use crate::queue::{format_wait, MAX_QUEUE_SIZE};
use crate::series::{Team, MAX_GAMES};
use crate::store::gamestats::{ALL_GAMETYPES, MAP_GAMETYPES};
use crate::store::queue_config::parse_role_list;
use crate::store::rankstats::{SortKey, MAX_MMR, MIN_MMR};
use crate::types::*;

/// Leaderboard rows per page.
pub const PAGE_SIZE: usize = 10;

/// `custom_id` prefix of the leaderboard navigation buttons.
const LEADERBOARD_PREFIX: &str = "lb:";

const COLOR_RED: u32 = 0xE7_4C_3C;
const COLOR_BLUE: u32 = 0x34_98_DB;
const COLOR_GOLD: u32 = 0xF1_C4_0F;

/// Commands only members holding an admin role may run.
pub const ADMIN_COMMANDS: &[&str] = &[
    "addplayer",
    "removeplayer",
    "resetqueue",
    "startmatch",
    "cancelmatch",
    "correctcurrent",
    "swap",
    "addgamestats",
    "mmr",
    "bannedroles",
    "requiredroles",
];

// ---------------------------------------------------------------------------
// Slash command definitions
// ---------------------------------------------------------------------------

fn command(name: &str, description: &str, options: Vec<ApplicationCommandOption>) -> ApplicationCommand {
    ApplicationCommand {
        id: None,
        name: name.into(),
        description: description.into(),
        options,
        kind: 1,
    }
}

fn option(kind: u8, name: &str, description: &str, required: bool) -> ApplicationCommandOption {
    ApplicationCommandOption {
        name: name.into(),
        description: description.into(),
        kind,
        required,
        choices: Vec::new(),
        min_value: None,
        max_value: None,
    }
}

fn with_choices<'a>(
    mut opt: ApplicationCommandOption,
    choices: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> ApplicationCommandOption {
    opt.choices = choices
        .into_iter()
        .map(|(name, value)| ApplicationCommandOptionChoice {
            name: name.into(),
            value: json!(value),
        })
        .collect();
    opt
}

fn with_range(mut opt: ApplicationCommandOption, min: i64, max: i64) -> ApplicationCommandOption {
    opt.min_value = Some(min);
    opt.max_value = Some(max);
    opt
}

fn team_option(name: &str, description: &str) -> ApplicationCommandOption {
    with_choices(
        option(OPTION_STRING, name, description, true),
        [("Red", "RED"), ("Blue", "BLUE")],
    )
}

/// Returns the list of slash commands to register with Discord.
pub fn slash_commands() -> Vec<ApplicationCommand> {
    let sort_choices = [
        SortKey::Rank,
        SortKey::Wins,
        SortKey::SeriesWins,
        SortKey::Mmr,
    ]
    .map(|k| (k.title(), k.as_str()));

    vec![
        command("join", "Join the matchmaking queue", vec![]),
        command("leave", "Leave the matchmaking queue", vec![]),
        command("queue", "Show who is in the queue", vec![]),
        command(
            "vote",
            "Vote for the winner of the current game",
            vec![team_option("winner", "Team that won the game")],
        ),
        command("series", "Show the current series", vec![]),
        command(
            "playerstats",
            "Show a player's stats",
            vec![option(OPTION_USER, "user", "Player to look up (default: you)", false)],
        ),
        command("rank", "Show your rank", vec![]),
        command(
            "leaderboard",
            "Show the leaderboard",
            vec![
                with_choices(option(OPTION_STRING, "sort_by", "Sort order (default: rank)", false), sort_choices),
                with_range(option(OPTION_INTEGER, "page", "Page number", false), 1, 1000),
            ],
        ),
        command("help", "Show available commands", vec![]),
        // Admin
        command(
            "addplayer",
            "Add a player to the queue",
            vec![option(OPTION_USER, "user", "Player to add", true)],
        ),
        command(
            "removeplayer",
            "Remove a player from the queue or the current series",
            vec![option(OPTION_USER, "user", "Player to remove", true)],
        ),
        command("resetqueue", "Empty the queue", vec![]),
        command(
            "startmatch",
            "Start a series from the current queue",
            vec![option(OPTION_BOOLEAN, "test", "Test mode: no stats recorded", false)],
        ),
        command("cancelmatch", "Cancel the current series", vec![]),
        command(
            "correctcurrent",
            "Change the winner of a game in the current series",
            vec![
                with_range(
                    option(OPTION_INTEGER, "game_number", "Game to correct", true),
                    1,
                    i64::from(MAX_GAMES),
                ),
                team_option("winner", "Team that actually won"),
            ],
        ),
        command(
            "swap",
            "Swap a red player with a blue player",
            vec![
                option(OPTION_USER, "red_player", "Player on red", true),
                option(OPTION_USER, "blue_player", "Player on blue", true),
            ],
        ),
        command(
            "addgamestats",
            "Record the map and gametype of a game",
            vec![
                with_range(option(OPTION_INTEGER, "match_number", "Match number", true), 1, 100_000),
                with_range(
                    option(OPTION_INTEGER, "game_number", "Game number", true),
                    1,
                    i64::from(MAX_GAMES),
                ),
                with_choices(
                    option(OPTION_STRING, "map_name", "Map played", true),
                    MAP_GAMETYPES.iter().map(|(map, _)| (*map, *map)),
                ),
                with_choices(
                    option(OPTION_STRING, "gametype", "Gametype played", true),
                    ALL_GAMETYPES.iter().map(|g| (*g, *g)),
                ),
            ],
        ),
        command(
            "mmr",
            "Set a player's MMR",
            vec![
                option(OPTION_USER, "player", "Player to update", true),
                with_range(option(OPTION_INTEGER, "value", "New MMR", true), MIN_MMR, MAX_MMR),
            ],
        ),
        command(
            "bannedroles",
            "Set the roles that may not queue",
            vec![option(OPTION_STRING, "roles", "Role ids or mentions, comma separated; empty clears", false)],
        ),
        command(
            "requiredroles",
            "Set the roles needed to queue",
            vec![option(OPTION_STRING, "roles", "Role ids or mentions, comma separated; empty clears", false)],
        ),
    ]
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Who invoked a command, and when.
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub user_id: &'a str,
    pub roles: &'a [String],
    pub is_admin: bool,
    pub now: DateTime<Utc>,
}

/// What to send back: the interaction response, plus an optional message
/// for the queue channel (series start and end).
#[derive(Debug, Clone)]
pub struct Reply {
    pub response: InteractionResponse,
    pub announcement: Option<CreateMessage>,
}

impl Reply {
    fn new(data: InteractionCallbackData) -> Self {
        Self {
            response: InteractionResponse::message(data),
            announcement: None,
        }
    }

    fn text(content: impl Into<String>) -> Self {
        Self::new(InteractionCallbackData::text(content))
    }

    fn ephemeral(content: impl Into<String>) -> Self {
        Self::new(InteractionCallbackData::text(content).ephemeral())
    }

    fn announce(mut self, embed: Embed) -> Self {
        self.announcement = Some(CreateMessage::new().embed(embed));
        self
    }

    fn announce_if(self, embed: Option<Embed>) -> Self {
        match embed {
            Some(embed) => self.announce(embed),
            None => self,
        }
    }
}

type CommandResult = Result<Reply, MatchmakingError>;

/// Run the slash command `name`. Rule violations come back as ephemeral
/// text; store failures are logged and answered with a generic message.
pub fn handle_command(
    mm: &mut Matchmaking,
    ctx: &CommandContext<'_>,
    name: &str,
    options: &[CommandOption],
) -> Reply {
    if ADMIN_COMMANDS.contains(&name) && !ctx.is_admin {
        return Reply::ephemeral("You don't have permission to use this command.");
    }
    match dispatch(mm, ctx, name, options) {
        Ok(reply) => reply,
        Err(MatchmakingError::Match(e)) => Reply::ephemeral(e.to_string()),
        Err(MatchmakingError::Store(e)) => {
            error!(command = name, error = %e, "command failed on data store");
            Reply::ephemeral("Something went wrong saving match data. Please tell an admin.")
        }
    }
}

fn dispatch(mm: &mut Matchmaking, ctx: &CommandContext<'_>, name: &str, options: &[CommandOption]) -> CommandResult {
    let user = ctx.user_id;
    match name {
        "join" => {
            let outcome = mm.join(user, ctx.roles, ctx.now)?;
            Ok(join_reply(&format!("{} joined the queue!", mention(user)), outcome))
        }
        "leave" => {
            let waited = mm.leave(user, ctx.now)?;
            Ok(Reply::text(format!(
                "{} left the queue after {}. ({}/{})",
                mention(user),
                format_wait(waited),
                mm.queue().len(),
                MAX_QUEUE_SIZE
            )))
        }
        "queue" => Ok(Reply::new(InteractionCallbackData::embed(queue_embed(mm, ctx.now)))),
        "vote" => {
            let team = Team::parse(required_str(options, "winner")?)?;
            match mm.vote(user, team, ctx.now)? {
                VoteResult::Pending { red, blue, needed } => Ok(Reply::ephemeral(format!(
                    "Vote recorded for {}. RED {} | BLUE {} ({} needed)",
                    team, red, blue, needed
                ))),
                VoteResult::Decided(game) => Ok(game_reply(&game)),
            }
        }
        "series" => {
            let embed = series_embed(mm)?;
            Ok(Reply::new(InteractionCallbackData::embed(embed)))
        }
        "playerstats" => {
            let target = option_str(options, "user").unwrap_or(user);
            Ok(Reply::new(InteractionCallbackData::embed(player_embed(mm, target)?)))
        }
        "rank" => {
            let stats = mm.player_stats(user)?;
            let (level, _, to_next) = mm.rank_table().progress(stats.xp);
            let next = if to_next > 0 {
                format!(", {} XP to level {}", to_next, level + 1)
            } else {
                String::new()
            };
            Ok(Reply::ephemeral(format!("You are level {} ({} XP{})", level, stats.xp, next)))
        }
        "leaderboard" => {
            let key = option_str(options, "sort_by").and_then(SortKey::parse).unwrap_or_default();
            let page = option_i64(options, "page").unwrap_or(1);
            Ok(Reply::new(leaderboard_page(mm, key, page)?))
        }
        "help" => Ok(Reply::ephemeral(help_text(ctx.is_admin))),

        "addplayer" => {
            let target = required_str(options, "user")?;
            let outcome = mm.add_player(target, ctx.now)?;
            Ok(join_reply(
                &format!("{} added {} to the queue.", mention(user), mention(target)),
                outcome,
            ))
        }
        "removeplayer" => {
            let target = required_str(options, "user")?;
            let text = match mm.remove_player(target)? {
                Removal::FromQueue => format!("Removed {} from the queue.", mention(target)),
                Removal::FromSeries(team) => format!("Removed {} from the {} team.", mention(target), team),
            };
            Ok(Reply::text(text))
        }
        "resetqueue" => {
            let removed = mm.reset_queue();
            Ok(Reply::text(format!("Queue reset ({} removed).", removed.len())))
        }
        "startmatch" => {
            let test = option_bool(options, "test").unwrap_or(false);
            let start = mm.start_match(test)?;
            Ok(Reply::text(format!("{} started.", start.series_label)).announce(series_start_embed(&start)))
        }
        "cancelmatch" => {
            let cancelled = mm.cancel(ctx.now)?;
            Ok(Reply::text(format!(
                "Match {} cancelled after {} game(s). Recorded games are kept.",
                cancelled.match_number, cancelled.games_played
            )))
        }
        "correctcurrent" => {
            let game_number = required_i64(options, "game_number")?;
            let team = Team::parse(required_str(options, "winner")?)?;
            let played = mm.series().ok_or(MatchError::NoActiveSeries)?.games.len();
            let game_number = usize::try_from(game_number)
                .ok()
                .filter(|&n| n >= 1)
                .ok_or(MatchError::InvalidGameNumber(played))?;
            let fix = mm.correct_game(game_number, team, ctx.now)?;
            Ok(correction_reply(&fix))
        }
        "swap" => {
            let red = required_str(options, "red_player")?;
            let blue = required_str(options, "blue_player")?;
            mm.swap(red, blue, ctx.now)?;
            Ok(Reply::text(format!(
                "Swapped {} to BLUE and {} to RED.",
                mention(red),
                mention(blue)
            )))
        }
        "addgamestats" => {
            let match_number = required_i64(options, "match_number")?;
            let game_number = required_i64(options, "game_number")?;
            let map = required_str(options, "map_name")?;
            let gametype = required_str(options, "gametype")?;
            let (Ok(match_number), Ok(game_number)) = (u64::try_from(match_number), u32::try_from(game_number)) else {
                return Err(MatchError::InvalidGameNumber(MAX_GAMES as usize).into());
            };
            mm.add_game_stats(match_number, game_number, map, gametype, ctx.now)?;
            Ok(Reply::text(format!(
                "Match {} game {}: {} on {}",
                match_number, game_number, gametype, map
            )))
        }
        "mmr" => {
            let target = required_str(options, "player")?;
            let value = required_i64(options, "value")?;
            mm.set_mmr(target, value)?;
            Ok(Reply::ephemeral(format!("Set {}'s MMR to {}.", mention(target), value)))
        }
        "bannedroles" | "requiredroles" => {
            let roles = parse_role_list(option_str(options, "roles").unwrap_or_default());
            let listed = role_list(&roles);
            if name == "bannedroles" {
                mm.set_banned_roles(roles)?;
                Ok(Reply::ephemeral(format!("Banned roles: {}", listed)))
            } else {
                mm.set_required_roles(roles)?;
                Ok(Reply::ephemeral(format!("Required roles: {}", listed)))
            }
        }
        _ => Ok(Reply::ephemeral(format!("Unknown command: `/{}`", name))),
    }
}

/// Handle a message component click. `None` for ids the bot doesn't own.
pub fn handle_component(mm: &Matchmaking, custom_id: &str) -> Option<Reply> {
    let (key, page) = parse_leaderboard_id(custom_id)?;
    let response = match leaderboard_page(mm, key, page) {
        Ok(data) => InteractionResponse::update(data),
        Err(e) => {
            error!(custom_id, error = %e, "failed to render leaderboard page");
            InteractionResponse::message(InteractionCallbackData::text("Couldn't load the leaderboard.").ephemeral())
        }
    };
    Some(Reply {
        response,
        announcement: None,
    })
}

// ---------------------------------------------------------------------------
// Replies for matchmaking outcomes
// ---------------------------------------------------------------------------

fn join_reply(prefix: &str, outcome: JoinOutcome) -> Reply {
    match outcome {
        JoinOutcome::Queued { size } => Reply::text(format!("{} ({}/{})", prefix, size, MAX_QUEUE_SIZE)),
        JoinOutcome::Started(start) => Reply::text(format!(
            "{} ({}/{}) Queue full, {} is starting!",
            prefix, MAX_QUEUE_SIZE, MAX_QUEUE_SIZE, start.series_label
        ))
        .announce(series_start_embed(&start)),
    }
}

fn game_reply(game: &GameResult) -> Reply {
    Reply::text(format!(
        "Game {} goes to {}! Series: RED {} - {} BLUE",
        game.game_number, game.winner, game.red_wins, game.blue_wins
    ))
    .announce_if(game.finished.as_ref().map(series_end_embed))
}

fn correction_reply(fix: &Correction) -> Reply {
    let mut text = if fix.old_winner == fix.new_winner {
        format!("Game {} was already recorded for {}.", fix.game_number, fix.new_winner)
    } else {
        format!(
            "Game {} corrected: {} -> {}.",
            fix.game_number, fix.old_winner, fix.new_winner
        )
    };
    if fix.dropped_games > 0 {
        text.push_str(&format!(
            " That decided the series, so {} later game(s) no longer count.",
            fix.dropped_games
        ));
    }
    Reply::text(text).announce_if(fix.finished.as_ref().map(series_end_embed))
}

// ---------------------------------------------------------------------------
// Embeds
// ---------------------------------------------------------------------------

fn mention(id: &str) -> String {
    format!("<@{}>", id)
}

fn mention_list(ids: &[String]) -> String {
    if ids.is_empty() {
        return "-".into();
    }
    ids.iter().map(|id| mention(id)).collect::<Vec<_>>().join("\n")
}

fn role_list(roles: &[String]) -> String {
    if roles.is_empty() {
        return "none".into();
    }
    roles.iter().map(|r| format!("<@&{}>", r)).collect::<Vec<_>>().join(", ")
}

fn series_start_embed(start: &SeriesStart) -> Embed {
    let mode = if start.test_mode { "Test" } else { "Ranked" };
    Embed::new()
        .title(format!("{} ({}) has started!", start.series_label, mode))
        .description("Best of seven. Vote for each game's winner with `/vote`.")
        .color(COLOR_GOLD)
        .field(format!("Red Team (avg {})", start.split.red_avg), mention_list(&start.split.red), true)
        .field(format!("Blue Team (avg {})", start.split.blue_avg), mention_list(&start.split.blue), true)
        .footer(format!("MMR difference: {}", start.split.diff))
}

fn series_end_embed(end: &SeriesEnd) -> Embed {
    let color = match end.winner {
        Team::Red => COLOR_RED,
        Team::Blue => COLOR_BLUE,
    };
    let footer = if end.test_mode {
        "Test series: no stats recorded"
    } else {
        "Stats recorded"
    };
    Embed::new()
        .title(format!("{} is over!", end.series_label))
        .description(format!(
            "{} wins {}-{} after {} games.",
            end.winner,
            end.score.red.max(end.score.blue),
            end.score.red.min(end.score.blue),
            end.games_played
        ))
        .color(color)
        .footer(footer)
}

fn queue_embed(mm: &Matchmaking, now: DateTime<Utc>) -> Embed {
    let queue = mm.queue();
    let list = if queue.is_empty() {
        "Nobody is queued.".to_string()
    } else {
        queue
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. {} ({})", i + 1, mention(&e.player_id), format_wait(now - e.joined_at)))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let mut embed = Embed::new()
        .title(format!("Queue ({}/{})", queue.len(), MAX_QUEUE_SIZE))
        .description(list)
        .color(COLOR_GOLD);
    if let Some(series) = mm.series() {
        embed = embed.footer(format!("{} in progress", series.series_label));
    }
    embed
}

fn series_embed(mm: &Matchmaking) -> Result<Embed, MatchError> {
    let series = mm.series().ok_or(MatchError::NoActiveSeries)?;
    let results = if series.games.is_empty() {
        "No games played yet.".to_string()
    } else {
        series
            .games
            .iter()
            .enumerate()
            .map(|(i, t)| format!("Game {}: {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let mode = if series.test_mode { "Test" } else { "Ranked" };
    Ok(Embed::new()
        .title(format!("{} ({})", series.series_label, mode))
        .description(format!(
            "RED {} - {} BLUE, playing game {}",
            series.wins(Team::Red),
            series.wins(Team::Blue),
            series.current_game
        ))
        .color(COLOR_GOLD)
        .field("Red Team", mention_list(&series.red), true)
        .field("Blue Team", mention_list(&series.blue), true)
        .field("Results", results, false))
}

fn player_embed(mm: &Matchmaking, player: &str) -> Result<Embed, MatchmakingError> {
    let stats = mm.player_stats(player)?;
    let (level, into_level, to_next) = mm.rank_table().progress(stats.xp);
    let progress = if to_next > 0 {
        format!("{} XP ({} into level, {} to next)", stats.xp, into_level, to_next)
    } else {
        format!("{} XP (max level)", stats.xp)
    };
    Ok(Embed::new()
        .title("Player Stats")
        .description(mention(player))
        .color(COLOR_GOLD)
        .thumbnail(rank_icon_url(level))
        .field("Level", level.to_string(), true)
        .field("XP", progress, true)
        .field("MMR", stats.mmr.to_string(), true)
        .field("Games", format!("{}W / {}L", stats.wins, stats.losses), true)
        .field("Win Rate", format!("{:.1}%", stats.win_rate()), true)
        .field(
            "Series",
            format!("{}W / {}L", stats.series_wins, stats.series_losses),
            true,
        ))
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

fn leaderboard_id(key: SortKey, page: i64) -> String {
    format!("{}{}:{}", LEADERBOARD_PREFIX, key.as_str(), page)
}

fn parse_leaderboard_id(custom_id: &str) -> Option<(SortKey, i64)> {
    let rest = custom_id.strip_prefix(LEADERBOARD_PREFIX)?;
    let (key, page) = rest.rsplit_once(':')?;
    Some((SortKey::parse(key)?, page.parse().ok()?))
}

/// Number of leaderboard pages for `players` entries; at least one.
pub fn total_pages(players: usize) -> i64 {
    players.div_ceil(PAGE_SIZE).max(1) as i64
}

/// One page of the leaderboard with previous/next buttons. `page` is
/// clamped to the pages that exist.
pub fn leaderboard_page(mm: &Matchmaking, key: SortKey, page: i64) -> Result<InteractionCallbackData, MatchmakingError> {
    let standings = mm.rankstats()?.sorted(key, mm.rank_table());
    let pages = total_pages(standings.len());
    let page = page.clamp(1, pages);
    let start = (page as usize - 1) * PAGE_SIZE;

    let rows: Vec<String> = standings
        .iter()
        .enumerate()
        .skip(start)
        .take(PAGE_SIZE)
        .map(|(i, s)| {
            let value = match key {
                SortKey::Rank => format!("Level {} ({} XP)", s.level, s.stats.xp),
                SortKey::Wins => format!("{} wins", s.stats.wins),
                SortKey::SeriesWins => format!("{} series wins", s.stats.series_wins),
                SortKey::Mmr => format!("{} MMR", s.stats.mmr),
            };
            format!("`#{}` {} | {}", i + 1, mention(&s.player_id), value)
        })
        .collect();
    let description = if rows.is_empty() {
        "No players ranked yet.".to_string()
    } else {
        rows.join("\n")
    };

    info!(sort = key.as_str(), page, pages, "leaderboard rendered");
    let embed = Embed::new()
        .title(format!("Leaderboard: {}", key.title()))
        .description(description)
        .color(COLOR_GOLD)
        .footer(format!("Page {}/{}", page, pages));
    let nav = action_row(vec![
        button(BUTTON_SECONDARY, "Previous", leaderboard_id(key, page - 1)).disabled(page <= 1),
        button(BUTTON_PRIMARY, "Next", leaderboard_id(key, page + 1)).disabled(page >= pages),
    ]);
    Ok(InteractionCallbackData::embed(embed).component_row(nav))
}

// ---------------------------------------------------------------------------
// Help
// ---------------------------------------------------------------------------

fn help_text(is_admin: bool) -> String {
    let mut text = String::from(
        "**Matchmaking**\n\
         `/join` - Join the queue\n\
         `/leave` - Leave the queue\n\
         `/queue` - Show the queue\n\
         `/vote winner` - Vote for the winner of the current game\n\
         `/series` - Show the current series\n\
         \n**Stats**\n\
         `/playerstats [user]` - Show a player's stats\n\
         `/rank` - Show your rank\n\
         `/leaderboard [sort_by] [page]` - Show the leaderboard\n\
         `/help` - Show this message\n",
    );
    if is_admin {
        text.push_str(
            "\n**Admin**\n\
             `/addplayer user` - Add a player to the queue\n\
             `/removeplayer user` - Remove a player from the queue or series\n\
             `/resetqueue` - Empty the queue\n\
             `/startmatch [test]` - Start a series from the queue\n\
             `/cancelmatch` - Cancel the current series\n\
             `/correctcurrent game_number winner` - Fix a game's winner\n\
             `/swap red_player blue_player` - Swap two players between teams\n\
             `/addgamestats match_number game_number map_name gametype` - Log map and gametype\n\
             `/mmr player value` - Set a player's MMR\n\
             `/bannedroles roles` - Roles that may not queue\n\
             `/requiredroles roles` - Roles needed to queue\n",
        );
    }
    text
}

// ---------------------------------------------------------------------------
// Option getters
// ---------------------------------------------------------------------------

fn find_option<'a>(options: &'a [CommandOption], name: &str) -> Option<&'a serde_json::Value> {
    options.iter().find(|o| o.name == name)?.value.as_ref()
}

fn option_str<'a>(options: &'a [CommandOption], name: &str) -> Option<&'a str> {
    find_option(options, name)?.as_str()
}

fn option_i64(options: &[CommandOption], name: &str) -> Option<i64> {
    find_option(options, name)?.as_i64()
}

fn option_bool(options: &[CommandOption], name: &str) -> Option<bool> {
    find_option(options, name)?.as_bool()
}

fn required_str<'a>(options: &'a [CommandOption], name: &str) -> Result<&'a str, MatchError> {
    option_str(options, name).ok_or_else(|| MatchError::MissingOption(name.to_string()))
}

fn required_i64(options: &[CommandOption], name: &str) -> Result<i64, MatchError> {
    option_i64(options, name).ok_or_else(|| MatchError::MissingOption(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DataDir;
    use chrono::TimeZone;

    fn open() -> (tempfile::TempDir, Matchmaking) {
        let dir = tempfile::tempdir().unwrap();
        let mm = Matchmaking::open(DataDir::new(dir.path())).unwrap();
        (dir, mm)
    }

    fn ctx<'a>(user_id: &'a str, is_admin: bool) -> CommandContext<'a> {
        CommandContext {
            user_id,
            roles: &[],
            is_admin,
            now: Utc.with_ymd_and_hms(2025, 6, 1, 21, 0, 0).unwrap(),
        }
    }

    fn opt(name: &str, value: serde_json::Value) -> CommandOption {
        CommandOption {
            name: name.into(),
            kind: OPTION_STRING,
            value: Some(value),
            options: Vec::new(),
        }
    }

    fn content(reply: &Reply) -> &str {
        reply
            .response
            .data
            .as_ref()
            .and_then(|d| d.content.as_deref())
            .unwrap_or_default()
    }

    fn is_ephemeral(reply: &Reply) -> bool {
        reply.response.data.as_ref().is_some_and(|d| d.is_ephemeral())
    }

    #[test]
    fn slash_commands_names_are_unique() {
        let cmds = slash_commands();
        let mut names: Vec<&str> = cmds.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), cmds.len(), "duplicate command names found");
        assert_eq!(cmds.len(), 20);
    }

    #[test]
    fn slash_commands_all_have_descriptions() {
        for cmd in slash_commands() {
            assert!(!cmd.description.is_empty(), "command '{}' has empty description", cmd.name);
            for opt in &cmd.options {
                assert!(!opt.description.is_empty(), "option '{}' of '{}'", opt.name, cmd.name);
            }
        }
    }

    #[test]
    fn every_admin_command_is_registered() {
        let cmds = slash_commands();
        for name in ADMIN_COMMANDS {
            assert!(cmds.iter().any(|c| c.name == *name), "missing /{}", name);
        }
    }

    #[test]
    fn vote_offers_both_teams() {
        let cmds = slash_commands();
        let vote = cmds.iter().find(|c| c.name == "vote").unwrap();
        let values: Vec<_> = vote.options[0].choices.iter().map(|c| c.value.clone()).collect();
        assert_eq!(values, vec![json!("RED"), json!("BLUE")]);
        assert!(vote.options[0].required);
    }

    #[test]
    fn help_lists_admin_commands_only_for_admins() {
        let player = help_text(false);
        let admin = help_text(true);
        for cmd in slash_commands() {
            let needle = format!("`/{}", cmd.name);
            assert!(admin.contains(&needle), "help text missing /{}", cmd.name);
            assert_eq!(
                player.contains(&needle),
                !ADMIN_COMMANDS.contains(&cmd.name.as_str()),
                "/{}",
                cmd.name
            );
        }
    }

    #[test]
    fn non_admin_is_refused() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("1", false), "resetqueue", &[]);
        assert!(is_ephemeral(&reply));
        assert!(content(&reply).contains("permission"));
    }

    #[test]
    fn join_and_leave_report_queue_size() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("1", false), "join", &[]);
        assert_eq!(content(&reply), "<@1> joined the queue! (1/8)");
        assert!(!is_ephemeral(&reply));

        let again = handle_command(&mut mm, &ctx("1", false), "join", &[]);
        assert!(is_ephemeral(&again));
        assert_eq!(content(&again), "You're already in the queue!");

        let left = handle_command(&mut mm, &ctx("1", false), "leave", &[]);
        assert!(content(&left).ends_with("(0/8)"));
    }

    #[test]
    fn full_queue_announces_teams() {
        let (_dir, mut mm) = open();
        let mut last = None;
        for i in 1..=8 {
            last = Some(handle_command(&mut mm, &ctx(&i.to_string(), false), "join", &[]));
        }
        let reply = last.unwrap();
        let announcement = reply.announcement.expect("series start announced");
        let embed = &announcement.embeds.unwrap()[0];
        assert_eq!(embed.title.as_deref(), Some("Series 1 (Ranked) has started!"));
        assert_eq!(embed.fields.len(), 2);
    }

    #[test]
    fn vote_without_series_is_ephemeral_error() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("1", false), "vote", &[opt("winner", json!("RED"))]);
        assert!(is_ephemeral(&reply));
        assert_eq!(content(&reply), "No active match!");
    }

    #[test]
    fn majority_vote_records_game() {
        let (_dir, mut mm) = open();
        for i in 1..=8 {
            mm.add_player(&i.to_string(), ctx("x", false).now).unwrap();
        }
        let red = mm.series().unwrap().red.clone();
        let blue = mm.series().unwrap().blue.clone();
        let voters: Vec<&String> = red.iter().chain(blue.iter().take(1)).collect();
        let mut replies = Vec::new();
        for voter in voters {
            replies.push(handle_command(&mut mm, &ctx(voter, false), "vote", &[opt("winner", json!("blue"))]));
        }
        assert!(is_ephemeral(&replies[0]));
        let decided = replies.last().unwrap();
        assert_eq!(content(decided), "Game 1 goes to BLUE! Series: RED 0 - 1 BLUE");
        assert_eq!(mm.series().unwrap().games, vec![Team::Blue]);
    }

    #[test]
    fn start_match_in_test_mode() {
        let (_dir, mut mm) = open();
        handle_command(&mut mm, &ctx("1", true), "addplayer", &[opt("user", json!("10"))]);
        handle_command(&mut mm, &ctx("1", true), "addplayer", &[opt("user", json!("11"))]);
        let reply = handle_command(&mut mm, &ctx("1", true), "startmatch", &[opt("test", json!(true))]);
        assert_eq!(content(&reply), "Test 1 started.");
        assert!(mm.series().unwrap().test_mode);
    }

    #[test]
    fn correct_rejects_zero_game_number() {
        let (_dir, mut mm) = open();
        let args = [opt("game_number", json!(0)), opt("winner", json!("RED"))];
        let reply = handle_command(&mut mm, &ctx("1", true), "correctcurrent", &args);
        assert_eq!(content(&reply), "No active match!");

        mm.add_player("10", ctx("1", true).now).unwrap();
        mm.add_player("11", ctx("1", true).now).unwrap();
        mm.start_match(true).unwrap();
        mm.record_winner(Team::Blue, ctx("1", true).now).unwrap();
        let reply = handle_command(&mut mm, &ctx("1", true), "correctcurrent", &args);
        assert_eq!(content(&reply), "Invalid game number! Must be between 1 and 1");

        let args = [opt("game_number", json!(1)), opt("winner", json!("RED"))];
        let reply = handle_command(&mut mm, &ctx("1", true), "correctcurrent", &args);
        assert_eq!(content(&reply), "Game 1 corrected: BLUE -> RED.");
    }

    #[test]
    fn correction_that_decides_early_reports_discarded_games() {
        let (_dir, mut mm) = open();
        let now = ctx("1", true).now;
        mm.add_player("10", now).unwrap();
        mm.add_player("11", now).unwrap();
        mm.start_match(true).unwrap();
        for t in [Team::Red, Team::Red, Team::Red, Team::Blue, Team::Blue] {
            mm.record_winner(t, now).unwrap();
        }
        let args = [opt("game_number", json!(4)), opt("winner", json!("RED"))];
        let reply = handle_command(&mut mm, &ctx("1", true), "correctcurrent", &args);
        assert_eq!(
            content(&reply),
            "Game 4 corrected: BLUE -> RED. That decided the series, so 1 later game(s) no longer count."
        );
        assert!(reply.announcement.is_some());
        assert!(mm.series().is_none());
    }

    #[test]
    fn cancelmatch_closes_the_series() {
        let (_dir, mut mm) = open();
        let now = ctx("1", true).now;
        mm.add_player("10", now).unwrap();
        mm.add_player("11", now).unwrap();
        mm.start_match(true).unwrap();
        mm.record_winner(Team::Red, now).unwrap();
        let reply = handle_command(&mut mm, &ctx("1", true), "cancelmatch", &[]);
        assert_eq!(content(&reply), "Match 1 cancelled after 1 game(s). Recorded games are kept.");
        assert!(mm.series().is_none());

        mm.add_player("10", now).unwrap();
        mm.add_player("11", now).unwrap();
        assert_eq!(mm.start_match(true).unwrap().match_number, 2);
    }

    #[test]
    fn missing_option_is_reported() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("1", true), "mmr", &[opt("player", json!("5"))]);
        assert!(is_ephemeral(&reply));
        assert!(content(&reply).contains("value"));
    }

    #[test]
    fn role_lists_are_saved() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("1", true), "bannedroles", &[opt("roles", json!("<@&42>, 43"))]);
        assert_eq!(content(&reply), "Banned roles: <@&42>, <@&43>");
        assert_eq!(mm.queue_config().banned_roles, vec!["42", "43"]);
        let cleared = handle_command(&mut mm, &ctx("1", true), "bannedroles", &[]);
        assert_eq!(content(&cleared), "Banned roles: none");
    }

    #[test]
    fn leaderboard_pages_clamp_and_link() {
        let (_dir, mut mm) = open();
        for i in 0..15 {
            mm.set_mmr(&format!("{}", 100 + i), 1000 + i).unwrap();
        }
        let data = leaderboard_page(&mm, SortKey::Mmr, 99).unwrap();
        let embed = &data.embeds.as_ref().unwrap()[0];
        assert_eq!(embed.footer.as_ref().unwrap().text, "Page 2/2");
        assert_eq!(embed.description.as_ref().unwrap().lines().count(), 5);
        assert!(embed.description.as_ref().unwrap().starts_with("`#11`"));

        let row = &data.components.as_ref().unwrap()[0];
        assert_eq!(row.components[0].custom_id.as_deref(), Some("lb:mmr:1"));
        assert_eq!(row.components[0].disabled, Some(false));
        assert_eq!(row.components[1].disabled, Some(true));
    }

    #[test]
    fn empty_leaderboard_has_one_page() {
        let (_dir, mm) = open();
        let data = leaderboard_page(&mm, SortKey::Rank, 0).unwrap();
        let embed = &data.embeds.as_ref().unwrap()[0];
        assert_eq!(embed.description.as_deref(), Some("No players ranked yet."));
        assert_eq!(embed.footer.as_ref().unwrap().text, "Page 1/1");
        assert_eq!(total_pages(0), 1);
        assert_eq!(total_pages(10), 1);
        assert_eq!(total_pages(11), 2);
    }

    #[test]
    fn leaderboard_button_updates_message() {
        let (_dir, mm) = open();
        let reply = handle_component(&mm, "lb:series_wins:1").unwrap();
        assert_eq!(reply.response.kind, InteractionCallbackType::UpdateMessage);
        assert!(handle_component(&mm, "lb:bogus:1").is_none());
        assert!(handle_component(&mm, "other").is_none());
        assert_eq!(parse_leaderboard_id("lb:series_wins:3"), Some((SortKey::SeriesWins, 3)));
    }

    #[test]
    fn player_stats_embed_shows_rank_icon() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("7", false), "playerstats", &[]);
        let embed = &reply.response.data.as_ref().unwrap().embeds.as_ref().unwrap()[0];
        assert_eq!(embed.description.as_deref(), Some("<@7>"));
        assert_eq!(embed.thumbnail.as_ref().unwrap().url, rank_icon_url(1));
    }

    #[test]
    fn unknown_command_is_ephemeral() {
        let (_dir, mut mm) = open();
        let reply = handle_command(&mut mm, &ctx("1", false), "dance", &[]);
        assert!(is_ephemeral(&reply));
    }
}
