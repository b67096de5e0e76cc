//! Vote-based removal of a player.

use chrono::{DateTime, Utc};
use tracing::info;

use super::connection::Outbox;
use super::game::LobbyState;
use super::player::{PlayerId, PlayerState};

/// Ballots required to kick someone from a lobby of `player_count`.
pub fn votes_needed(player_count: usize) -> usize {
    if player_count % 2 == 0 {
        player_count / 2
    } else {
        player_count / 2 + 1
    }
}

impl LobbyState {
    /// `voter` asks to remove the player whose ID is `target`.
    pub fn kick_vote(
        &mut self,
        voter: PlayerId,
        target: &str,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) {
        if !self.settings.enable_votekick {
            out.private_system_message(voter, "Votekick is disabled in this lobby!");
            return;
        }

        let Ok(target) = target.parse::<PlayerId>() else {
            return;
        };
        if target == voter {
            return;
        }
        let Some(target_index) = self.position(&target) else {
            return;
        };
        let Some(ballot_cast) = self.player_mut(&voter).map(|p| p.vote_to_kick(target)) else {
            return;
        };
        if !ballot_cast {
            return;
        }

        let votes = self
            .players
            .iter()
            .filter(|p| p.has_voted_to_kick(&target))
            .count();
        let needed = votes_needed(self.players.len());
        out.system_message(format!(
            "({}/{}) players voted to kick {}",
            votes, needed, self.players[target_index].name
        ));

        if votes >= needed {
            self.kick(target_index, now, out);
        }
    }

    fn kick(&mut self, index: usize, now: DateTime<Utc>, out: &mut Outbox) {
        let kicked = self.players.remove(index);
        for player in &mut self.players {
            player.withdraw_kick_vote(&kicked.id);
        }

        out.system_message(format!("{} has been kicked from the lobby", kicked.name));
        info!(
            lobby = %self.id,
            player = %kicked.id,
            in_lobby_secs = kicked.time_in_lobby(now).num_seconds(),
            "player kicked"
        );

        // The drawer reference stays on the kicked ID so rotation resumes from
        // the fallback and no bonus is credited.
        let was_drawer = self.drawer == Some(kicked.id);
        if was_drawer {
            out.system_message(
                "Since the kicked player has been drawing, none of you will get any points this round.",
            );
            for player in &mut self.players {
                if player.state() == PlayerState::Standby {
                    player.score -= player.last_score;
                }
                player.last_score = 0;
            }
            self.score_earned_by_guessers = 0;
        }

        if let Some(connection) = kicked.connection {
            out.close(connection.id);
        }

        self.recalculate_ranks();

        if self.owner == Some(kicked.id) {
            self.owner = self.players.iter().find(|p| p.connected).map(|p| p.id);
            if let Some(owner) = self.owner.and_then(|id| self.player(&id)) {
                out.system_message(format!("{} is the new lobby owner.", owner.name));
            }
        }

        self.trigger_players_update(out);

        if self.is_round_active() && (was_drawer || !self.is_anyone_still_guessing()) {
            self.end_round(now, out);
        }
    }
}
