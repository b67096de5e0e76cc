//! Chat commands and chat text filtering.
//!
//! Input starting with `!` is a command:
//!
//! | Command | Who | Effect |
//! |---|---|---|
//! | `!start` | owner, no game running | reset scores, start the first turn |
//! | `!setmp <n>` | owner | change max players |
//! | `!nick [name]` | anyone | rename, or pick a random name |
//! | `!help` | anyone | list commands |

use chrono::{DateTime, Utc};
use tracing::info;

use super::config::LOBBY_SETTING_BOUNDS;
use super::connection::Outbox;
use super::event::ServerEvent;
use super::game::LobbyState;
use super::player::PlayerId;

/// Text transformations applied to user content before broadcast.
pub trait ChatFilter: Send + Sync {
    /// Make text safe to embed in markup.
    fn escape(&self, text: &str) -> String;

    /// Full treatment for chat lines. Defaults to escaping only.
    fn filter(&self, text: &str) -> String {
        self.escape(text)
    }
}

/// Escapes the five HTML-significant characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEscapeFilter;

impl ChatFilter for HtmlEscapeFilter {
    fn escape(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&#34;"),
                '\'' => escaped.push_str("&#39;"),
                _ => escaped.push(c),
            }
        }
        escaped
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    SetMaxPlayers(Option<String>),
    Nick(Vec<String>),
    Help,
    Unknown(String),
}

impl Command {
    /// Parse the text after the `!` marker.
    pub fn parse(input: &str) -> Option<Self> {
        let mut args = split_arguments(input).into_iter();
        let name = args.next()?.to_lowercase();
        let command = match name.as_str() {
            "start" => Self::Start,
            "setmp" => Self::SetMaxPlayers(args.next()),
            "help" => Self::Help,
            "nick" | "name" | "username" | "nickname" | "playername" | "alias" => {
                Self::Nick(args.collect())
            }
            _ => Self::Unknown(name),
        };
        Some(command)
    }
}

/// Split on whitespace, keeping double-quoted sections together.
pub fn split_arguments(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                if quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    args
}

const HELP_TEXT: &str = "Commands: !start (owner), !setmp <players> (owner), !nick <name>, !help";

/// Execute `input` (without the `!`) on behalf of `caller`.
pub fn handle_command(
    state: &mut LobbyState,
    caller: PlayerId,
    input: &str,
    now: DateTime<Utc>,
    out: &mut Outbox,
) {
    let Some(command) = Command::parse(input) else {
        return;
    };

    match command {
        Command::Start => command_start(state, caller, now, out),
        Command::SetMaxPlayers(value) => command_set_max_players(state, caller, value, out),
        Command::Nick(args) => command_nick(state, caller, &args, out),
        Command::Help => out.private_system_message(caller, HELP_TEXT),
        Command::Unknown(_) => {}
    }
}

fn command_start(state: &mut LobbyState, caller: PlayerId, now: DateTime<Utc>, out: &mut Outbox) {
    if state.round != 0 || state.owner != Some(caller) {
        return;
    }

    for player in &mut state.players {
        player.score = 0;
        player.last_score = 0;
    }
    state.used_words.clear();

    info!(lobby = %state.id, "game started");
    state.advance(now, out);
}

fn command_set_max_players(
    state: &mut LobbyState,
    caller: PlayerId,
    value: Option<String>,
    out: &mut Outbox,
) {
    if state.owner != Some(caller) {
        out.private_system_message(caller, "Only the lobby owner can change MaxPlayers setting.");
        return;
    }
    let Some(value) = value else {
        return;
    };

    let bounds = LOBBY_SETTING_BOUNDS;
    let Ok(requested) = value.trim().parse::<usize>() else {
        out.private_system_message(caller, "MaxPlayers value must be numeric.");
        return;
    };

    let player_count = state.players.len();
    if requested >= player_count
        && requested >= bounds.min_max_players
        && requested <= bounds.max_max_players
    {
        state.settings.max_players = requested;
        out.system_message(format!("MaxPlayers value has been changed to {}", requested));
    } else {
        let lower = player_count.max(bounds.min_max_players);
        out.private_system_message(
            caller,
            format!(
                "MaxPlayers value should be between {} and {}.",
                lower, bounds.max_max_players
            ),
        );
    }
}

fn command_nick(state: &mut LobbyState, caller: PlayerId, args: &[String], out: &mut Outbox) {
    let name = state.sanitize_name(&args.join(" "));
    let generated = args.iter().all(|a| a.trim().is_empty());

    let Some(player) = state.player_mut(&caller) else {
        return;
    };
    info!(player = %caller, from = %player.name, to = %name, "player renamed");
    player.name = name.clone();

    if generated {
        out.to_player(caller, ServerEvent::ResetUsername);
    } else {
        out.to_player(caller, ServerEvent::PersistUsername(name));
    }
    state.trigger_players_update(out);
}
