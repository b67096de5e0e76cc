//! Turn state machine.
//!
//! [`LobbyState`] is the complete, synchronous state of one lobby. Every
//! operation takes the current time explicitly and writes its outbound
//! events into an [`Outbox`]; it never blocks and never touches a timer.
//! The owning [`Lobby`](super::lobby::Lobby) serializes access and keeps the
//! round timer in step with [`LobbyState::epoch`].
//!
//! ```text
//!  NoGame ──advance──▶ RoundActive ──end_round──▶ RoundActive ── ... ──▶ GameOver
//! (round 0)            (drawer set,               (next drawer)          (drawer none,
//!    ▲                  timer running)                                    round 0)
//!    └─────────────────────────────── !start ──────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::chat::{self, ChatFilter};
use super::config::{LobbySettings, MAX_NAME_LENGTH};
use super::connection::{Connection, ConnectionId, Outbox};
use super::event::{ChatMessage, ClientEvent, DrawOp, NextTurn, Ready, ServerEvent};
use super::lobby::{LobbyError, LobbyId};
use super::names::NameGenerator;
use super::player::{Player, PlayerEvent, PlayerId, PlayerState, PlayerView};
use super::scoring::{self, GuessOutcome};
use super::words::{self, HintSchedule, WordHint};

/// Collaborators a lobby needs but does not implement.
#[derive(Clone)]
pub struct LobbyServices {
    pub chat_filter: Arc<dyn ChatFilter>,
    pub names: Arc<dyn NameGenerator>,
}

impl std::fmt::Debug for LobbyServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyServices").finish_non_exhaustive()
    }
}

/// State of one game instance.
#[derive(Debug)]
pub struct LobbyState {
    pub(super) id: LobbyId,
    pub(super) settings: LobbySettings,
    pub(super) services: LobbyServices,

    /// Word corpus for the lobby's language
    pub(super) words: Vec<String>,

    /// Drawer rotation order
    pub(super) players: Vec<Player>,
    pub(super) owner: Option<PlayerId>,

    /// May point at a player who has just been kicked until the turn ends
    pub(super) drawer: Option<PlayerId>,

    /// 0 while no game is running
    pub(super) round: u32,

    pub(super) current_word: String,
    pub(super) word_choice: Vec<String>,

    /// What guessers see
    pub(super) word_hints: Vec<WordHint>,
    /// What the drawer and players who already guessed see
    pub(super) word_hints_shown: Vec<WordHint>,

    /// Points earned by guessers this turn
    pub(super) score_earned_by_guessers: i64,
    pub(super) used_words: HashSet<String>,

    /// Epoch milliseconds, 0 when no turn is running
    pub(super) round_end_time: i64,
    pub(super) current_drawing: Vec<DrawOp>,

    pub(super) hint_schedule: HintSchedule,

    /// Bumped whenever a turn starts or the game stops
    pub(super) epoch: u64,

    pub(super) rng: StdRng,

    pub created_at: DateTime<Utc>,
}

impl LobbyState {
    /// Create a lobby whose only member is its owner.
    ///
    /// Returns the state, the owner's ID and the owner's session token.
    pub fn new(
        id: LobbyId,
        settings: LobbySettings,
        words: Vec<String>,
        owner_name: &str,
        services: LobbyServices,
        rng: StdRng,
    ) -> (Self, PlayerId, String) {
        let hint_schedule = HintSchedule::new(settings.drawing_time);
        let mut state = Self {
            id,
            settings,
            services,
            words,
            players: Vec::new(),
            owner: None,
            drawer: None,
            round: 0,
            current_word: String::new(),
            word_choice: Vec::new(),
            word_hints: Vec::new(),
            word_hints_shown: Vec::new(),
            score_earned_by_guessers: 0,
            used_words: HashSet::new(),
            round_end_time: 0,
            current_drawing: Vec::new(),
            hint_schedule,
            epoch: 0,
            rng,
            created_at: Utc::now(),
        };

        let owner = Player::new(state.sanitize_name(owner_name));
        let (owner_id, token) = (owner.id, owner.session_token.clone());
        state.players.push(owner);
        state.owner = Some(owner_id);

        (state, owner_id, token)
    }

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    /// Time since the lobby was created.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *id)
    }

    pub(super) fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == *id)
    }

    pub(super) fn position(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *id)
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    pub fn drawer(&self) -> Option<PlayerId> {
        self.drawer
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_word(&self) -> &str {
        &self.current_word
    }

    pub fn word_choice(&self) -> &[String] {
        &self.word_choice
    }

    pub fn word_hints(&self) -> &[WordHint] {
        &self.word_hints
    }

    pub fn round_end_time(&self) -> i64 {
        self.round_end_time
    }

    pub fn current_drawing(&self) -> &[DrawOp] {
        &self.current_drawing
    }

    pub fn score_pool(&self) -> i64 {
        self.score_earned_by_guessers
    }

    pub fn used_words(&self) -> &HashSet<String> {
        &self.used_words
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// A turn is running and the timer should be ticking.
    pub fn is_round_active(&self) -> bool {
        self.drawer.is_some() && self.round > 0
    }

    pub fn has_connected_players(&self) -> bool {
        self.players.iter().any(|p| p.connected)
    }

    pub fn is_anyone_still_guessing(&self) -> bool {
        self.players.iter().any(|p| p.is_guessing())
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    /// The hint array `player` is allowed to see.
    pub fn available_hints(&self, player: &Player) -> Vec<WordHint> {
        if player.state().sees_full_word() {
            self.word_hints_shown.clone()
        } else {
            self.word_hints.clone()
        }
    }

    pub(super) fn recalculate_ranks(&mut self) {
        scoring::recalculate_ranks(&mut self.players);
    }

    pub(super) fn trigger_players_update(&self, out: &mut Outbox) {
        out.to_all(ServerEvent::UpdatePlayers(self.player_views()));
    }

    pub(super) fn trigger_word_hint_update(&self, out: &mut Outbox) {
        if self.current_word.is_empty() {
            return;
        }
        for player in &self.players {
            out.to_player(player.id, ServerEvent::UpdateWordhint(self.available_hints(player)));
        }
    }

    /// Cap and escape a requested display name, generating one if blank.
    pub(super) fn sanitize_name(&self, requested: &str) -> String {
        let capped: String = requested.trim().chars().take(MAX_NAME_LENGTH).collect();
        if capped.is_empty() {
            return self.services.names.generate();
        }
        self.services.chat_filter.escape(&capped)
    }

    /// Start the next turn, or finish the game after the last turn.
    pub fn advance(&mut self, now: DateTime<Utc>, out: &mut Outbox) {
        self.epoch += 1;

        for player in &mut self.players {
            if let Err(e) = player.begin_turn() {
                warn!(lobby = %self.id, player = %player.id, error = %e, "turn reset");
            }
        }
        self.current_drawing.clear();
        self.word_choice.clear();

        if self.players.is_empty() {
            self.stop_game();
            return;
        }

        let last_id = self.players[self.players.len() - 1].id;
        let next_drawer = match self.drawer {
            None => {
                self.round = 1;
                self.players[0].id
            }
            Some(current) if current == last_id => {
                if self.round >= self.settings.rounds {
                    self.finish_game(out);
                    return;
                }
                self.round += 1;
                self.players[0].id
            }
            Some(current) => match self.position(&current) {
                Some(index) => self.players[index + 1].id,
                None => self.fallback_drawer(),
            },
        };

        self.drawer = Some(next_drawer);
        let assigned = self
            .player_mut(&next_drawer)
            .map(|drawer| drawer.apply_mut(PlayerEvent::AssignDrawer));
        if let Some(Err(e)) = assigned {
            warn!(lobby = %self.id, player = %next_drawer, error = %e, "drawer state");
        }

        self.word_choice = words::random_words(
            &self.words,
            &self.settings.custom_words,
            self.settings.custom_word_chance,
            &self.used_words,
            &mut self.rng,
        );
        out.to_player(next_drawer, ServerEvent::PromptWords(self.word_choice.clone()));

        self.round_end_time = now.timestamp_millis() + i64::from(self.settings.drawing_time) * 1000;
        self.hint_schedule = HintSchedule::new(self.settings.drawing_time);

        self.recalculate_ranks();
        out.to_all(ServerEvent::NextTurn(NextTurn {
            round: self.round,
            players: self.player_views(),
            round_end_time: self.round_end_time,
        }));

        info!(lobby = %self.id, round = self.round, drawer = %next_drawer, "turn started");
    }

    /// First connected player, or the first player if nobody is connected.
    fn fallback_drawer(&self) -> PlayerId {
        self.players
            .iter()
            .find(|p| p.connected)
            .unwrap_or(&self.players[0])
            .id
    }

    fn stop_game(&mut self) {
        self.drawer = None;
        self.round = 0;
        self.round_end_time = 0;
        self.current_word.clear();
        self.word_hints.clear();
        self.word_hints_shown.clear();
        self.score_earned_by_guessers = 0;
    }

    fn finish_game(&mut self, out: &mut Outbox) {
        self.stop_game();
        self.recalculate_ranks();
        self.trigger_players_update(out);
        out.system_message("Game over. Type !start again to start a new round.");
        info!(lobby = %self.id, "game over");
    }

    /// Reveal the word, credit the drawer and move on.
    pub fn end_round(&mut self, now: DateTime<Utc>, out: &mut Outbox) {
        let message = if self.current_word.is_empty() {
            "Round over. No word was chosen.".to_string()
        } else {
            format!("Round over. The word was '{}'", self.current_word)
        };

        let bonus = scoring::drawer_bonus(self.score_earned_by_guessers, self.players.len());
        if let Some(drawer) = self.drawer {
            if let Some(drawer) = self.player_mut(&drawer) {
                drawer.last_score = bonus.unwrap_or(0);
                drawer.score += drawer.last_score;
            }
        }

        self.score_earned_by_guessers = 0;
        if !self.current_word.is_empty() {
            self.used_words.insert(std::mem::take(&mut self.current_word));
        }
        self.word_hints.clear();
        self.word_hints_shown.clear();

        for player in &mut self.players {
            if player.is_guessing() {
                player.last_score = 0;
            }
        }

        debug!(lobby = %self.id, round = self.round, "turn over");
        out.system_message(message);

        self.advance(now, out);
    }

    /// One timer period elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>, out: &mut Outbox) {
        if !self.is_round_active() {
            return;
        }

        if self.hint_schedule.tick() && !self.word_hints.is_empty() {
            let revealed =
                words::reveal_random_hint(&mut self.word_hints, &self.current_word, &mut self.rng);
            if revealed.is_some() {
                self.trigger_word_hint_update(out);
            }
        }

        if now.timestamp_millis() >= self.round_end_time {
            self.end_round(now, out);
        }
    }

    /// Route one decoded client event.
    pub fn handle_event(
        &mut self,
        sender: PlayerId,
        event: ClientEvent,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) {
        match event {
            ClientEvent::Message(text) => self.handle_message(sender, &text, now, out),
            ClientEvent::Line(line) => self.draw(sender, DrawOp::Line(line), out),
            ClientEvent::Fill(fill) => self.draw(sender, DrawOp::Fill(fill), out),
            ClientEvent::ClearDrawingBoard => self.clear_drawing(sender, out),
            ClientEvent::ChooseWord(index) => self.choose_word(sender, index, out),
            ClientEvent::KickVote(target) => self.kick_vote(sender, &target, now, out),
        }
    }

    /// Chat input: a command, a guess, or a plain message.
    pub fn handle_message(
        &mut self,
        sender: PlayerId,
        input: &str,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return;
        }
        if let Some(command) = trimmed.strip_prefix('!') {
            chat::handle_command(self, sender, command, now, out);
            return;
        }

        let Some(state) = self.player(&sender).map(Player::state) else {
            return;
        };

        if self.current_word.is_empty() {
            self.send_message_to_all(sender, trimmed, out);
            return;
        }

        match state {
            PlayerState::Drawing | PlayerState::Standby => {
                self.send_message_to_non_guessing(sender, trimmed, out)
            }
            PlayerState::Guessing => match scoring::evaluate_guess(trimmed, &self.current_word) {
                GuessOutcome::Correct => self.accept_guess(sender, now, out),
                GuessOutcome::Close => {
                    out.private_system_message(sender, format!("'{}' is very close.", trimmed));
                    self.send_message_to_all(sender, trimmed, out);
                }
                GuessOutcome::Wrong => self.send_message_to_all(sender, trimmed, out),
            },
        }
    }

    fn accept_guess(&mut self, sender: PlayerId, now: DateTime<Utc>, out: &mut Outbox) {
        let points = scoring::guess_points(self.round_end_time, now);
        let Some(player) = self.player_mut(&sender) else {
            return;
        };
        if player.apply_mut(PlayerEvent::GuessCorrectly).is_err() {
            return;
        }
        player.last_score = points;
        player.score += points;
        self.score_earned_by_guessers += points;

        out.private_system_message(sender, "You have correctly guessed the word.");
        debug!(lobby = %self.id, player = %sender, points, "correct guess");

        if !self.is_anyone_still_guessing() {
            self.end_round(now, out);
            return;
        }

        out.to_player(sender, ServerEvent::UpdateWordhint(self.word_hints_shown.clone()));
        self.recalculate_ranks();
        out.to_all(ServerEvent::CorrectGuess);
        self.trigger_players_update(out);
    }

    fn chat_message(&self, sender: PlayerId, text: &str) -> Option<ChatMessage> {
        let author = self.player(&sender)?.name.clone();
        Some(ChatMessage {
            author: self.services.chat_filter.escape(&author),
            content: self.services.chat_filter.filter(text),
        })
    }

    fn send_message_to_all(&self, sender: PlayerId, text: &str, out: &mut Outbox) {
        if let Some(message) = self.chat_message(sender, text) {
            out.to_all(ServerEvent::Message(message));
        }
    }

    fn send_message_to_non_guessing(&self, sender: PlayerId, text: &str, out: &mut Outbox) {
        let Some(message) = self.chat_message(sender, text) else {
            return;
        };
        for player in self.players.iter().filter(|p| !p.is_guessing()) {
            out.to_player(player.id, ServerEvent::NonGuessingPlayerMessage(message.clone()));
        }
    }

    fn is_drawer(&self, player: &PlayerId) -> bool {
        self.drawer == Some(*player)
    }

    /// Record and relay a drawing primitive from the drawer.
    pub fn draw(&mut self, sender: PlayerId, op: DrawOp, out: &mut Outbox) {
        if !self.is_drawer(&sender) {
            return;
        }
        self.current_drawing.push(op);
        let relayed = match op {
            DrawOp::Line(line) => ServerEvent::Line(line),
            DrawOp::Fill(fill) => ServerEvent::Fill(fill),
        };
        out.to_all_except(sender, relayed);
    }

    pub fn clear_drawing(&mut self, sender: PlayerId, out: &mut Outbox) {
        if !self.is_drawer(&sender) {
            return;
        }
        self.current_drawing.clear();
        out.to_all_except(sender, ServerEvent::ClearDrawingBoard);
    }

    /// The drawer picks one of the offered words.
    pub fn choose_word(&mut self, sender: PlayerId, index: usize, out: &mut Outbox) {
        if !self.is_drawer(&sender) || index >= self.word_choice.len() {
            return;
        }

        self.current_word = std::mem::take(&mut self.word_choice).swap_remove(index);
        self.word_hints = words::create_word_hint_for(&self.current_word, false);
        self.word_hints_shown = words::create_word_hint_for(&self.current_word, true);

        self.trigger_word_hint_update(out);
        out.to_player(sender, ServerEvent::YourTurn);
    }

    /// Add a player to the end of the rotation.
    pub fn join_player(
        &mut self,
        name: &str,
        out: &mut Outbox,
    ) -> Result<(PlayerId, String), LobbyError> {
        if self.players.len() >= self.settings.max_players {
            return Err(LobbyError::Full);
        }

        let player = Player::new(self.sanitize_name(name));
        let joined = (player.id, player.session_token.clone());
        self.players.push(player);

        self.recalculate_ranks();
        self.trigger_players_update(out);
        Ok(joined)
    }

    /// Attach a live connection to the player owning `session_token`.
    pub fn connect(
        &mut self,
        session_token: &str,
        connection: Connection,
        out: &mut Outbox,
    ) -> Result<PlayerId, LobbyError> {
        let index = self
            .players
            .iter()
            .position(|p| p.session_token == session_token)
            .ok_or(LobbyError::UnknownSession)?;
        let player_id = self.players[index].id;

        let from_same_ip = self
            .players
            .iter()
            .filter(|p| p.id != player_id)
            .filter_map(|p| p.connection.as_ref())
            .filter(|c| c.remote_ip == connection.remote_ip)
            .count();
        if from_same_ip >= self.settings.clients_per_ip_limit {
            return Err(LobbyError::TooManyConnections(connection.remote_ip));
        }

        let player = &mut self.players[index];
        if let Some(previous) = player.connection.replace(connection) {
            out.close(previous.id);
        }
        player.connected = true;

        let ready = self.ready_snapshot(&player_id);
        if let Some(ready) = ready {
            out.to_player(player_id, ServerEvent::Ready(Box::new(ready)));
        }
        self.trigger_players_update(out);
        Ok(player_id)
    }

    /// Detach the player's live connection if it is still `connection`.
    ///
    /// Returns false once nobody in the lobby is connected any more.
    pub fn disconnect(
        &mut self,
        player_id: PlayerId,
        connection: ConnectionId,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) -> bool {
        if let Some(player) = self.player_mut(&player_id) {
            if player.connection.as_ref().map(|c| c.id) == Some(connection) {
                let connected_secs = player
                    .connection
                    .take()
                    .map_or(0, |c| c.age(now).num_seconds());
                player.connected = false;
                debug!(
                    lobby = %self.id,
                    player = %player_id,
                    connected_secs,
                    "player disconnected"
                );

                if self.has_connected_players() {
                    self.trigger_players_update(out);
                }
            }
        }
        self.has_connected_players()
    }

    /// Full state for a freshly connected player.
    pub fn ready_snapshot(&self, player_id: &PlayerId) -> Option<Ready> {
        let player = self.player(player_id)?;
        Some(Ready {
            player_id: player.id,
            drawing: player.is_drawing(),
            round: self.round,
            max_rounds: self.settings.rounds,
            round_end_time: self.round_end_time,
            word_hints: self.available_hints(player),
            players: self.player_views(),
            current_drawing: self.current_drawing.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::state::chat::HtmlEscapeFilter;
    use crate::state::names::PetNameGenerator;
    use rand::SeedableRng;

    pub const WORDS: [&str; 8] = [
        "apple", "banana", "cherry", "dragon", "eagle", "forest", "guitar", "harbor",
    ];

    pub fn services() -> LobbyServices {
        LobbyServices {
            chat_filter: Arc::new(HtmlEscapeFilter),
            names: Arc::new(PetNameGenerator),
        }
    }

    pub fn settings(rounds: u32) -> LobbySettings {
        LobbySettings {
            drawing_time: 60,
            rounds,
            max_players: 8,
            custom_word_chance: 0,
            clients_per_ip_limit: 24,
            ..Default::default()
        }
    }

    /// Lobby with `count` connected players named P0, P1, ...
    pub fn lobby(count: usize, rounds: u32) -> (LobbyState, Vec<PlayerId>) {
        let (mut state, owner, token) = LobbyState::new(
            LobbyId::new(),
            settings(rounds),
            WORDS.iter().map(|w| w.to_string()).collect(),
            "P0",
            services(),
            StdRng::seed_from_u64(42),
        );
        let mut out = Outbox::new();
        let mut ids = vec![owner];
        state
            .connect(&token, Connection::new("10.0.0.1".parse().unwrap()), &mut out)
            .unwrap();
        for i in 1..count {
            let (id, token) = state.join_player(&format!("P{}", i), &mut out).unwrap();
            state
                .connect(&token, Connection::new("10.0.0.1".parse().unwrap()), &mut out)
                .unwrap();
            ids.push(id);
        }
        (state, ids)
    }

    pub fn now() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// Events delivered to `player`, directly or by broadcast.
    pub fn seen_by(
        out: &[crate::state::connection::Dispatch],
        player: PlayerId,
    ) -> Vec<ServerEvent> {
        use crate::state::connection::Dispatch;
        out.iter()
            .filter_map(|d| match d {
                Dispatch::To(p, e) if *p == player => Some(e.clone()),
                Dispatch::All(e) => Some(e.clone()),
                Dispatch::AllExcept(p, e) if *p != player => Some(e.clone()),
                _ => None,
            })
            .collect()
    }
}
