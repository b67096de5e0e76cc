//! Guess evaluation, score formulas and ranking.

use super::player::Player;

/// Points for a correct guess with `round_end_ms` as the turn deadline.
///
/// `ceil(max(seconds_left, 1)^1.3 * 2)`, where seconds are truncated on both
/// sides before subtracting.
pub fn guess_points(round_end_ms: i64, now: chrono::DateTime<chrono::Utc>) -> i64 {
    let seconds_left = round_end_ms.div_euclid(1000) - now.timestamp();
    let base = seconds_left.max(1) as f64;
    (base.powf(1.3) * 2.0).ceil() as i64
}

/// The drawer's share of what the guessers earned this turn.
///
/// Returns `None` when there is nothing to credit.
pub fn drawer_bonus(pool: i64, player_count: usize) -> Option<i64> {
    if pool <= 0 || player_count < 2 {
        return None;
    }
    let average = pool as f64 / (player_count - 1) as f64;
    let bonus = (average * 1.1).floor() as i64;
    (bonus > 0).then_some(bonus)
}

/// Outcome of comparing a guess against the secret word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    Correct,
    /// Edit distance of exactly one
    Close,
    Wrong,
}

/// Compare case-insensitively.
pub fn evaluate_guess(guess: &str, word: &str) -> GuessOutcome {
    let guess = guess.to_lowercase();
    let word = word.to_lowercase();
    if guess == word {
        GuessOutcome::Correct
    } else if edit_distance(&guess, &word) == 1 {
        GuessOutcome::Close
    } else {
        GuessOutcome::Wrong
    }
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Rank is one plus the number of players with a strictly greater score.
pub fn recalculate_ranks(players: &mut [Player]) {
    let scores: Vec<i64> = players.iter().map(|p| p.score).collect();
    for player in players.iter_mut() {
        player.rank = scores.iter().filter(|&&s| s > player.score).count() + 1;
    }
}
