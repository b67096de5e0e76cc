//! Word candidates, hint arrays and progressive hint reveal.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::{is_supported_language, HINT_REVEALS_PER_ROUND, WORD_CHOICE_COUNT};

/// Random draws before falling back to a full scan of the word pool.
const PICK_ATTEMPTS: usize = 16;

/// One character slot of the secret word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordHint {
    /// `None` until revealed
    pub character: Option<char>,
    /// False for separators, which are therefore visible even while hidden
    pub underline: bool,
}

impl WordHint {
    pub fn is_hidden(&self) -> bool {
        self.character.is_none()
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '_' | '-')
}

/// Build one hint per character of `word`.
pub fn create_word_hint_for(word: &str, reveal_all: bool) -> Vec<WordHint> {
    word.chars()
        .map(|c| WordHint {
            character: reveal_all.then_some(c),
            underline: !is_separator(c),
        })
        .collect()
}

/// Reveal one uniformly chosen hidden slot. Returns the revealed index, or
/// `None` if nothing was left to reveal.
pub fn reveal_random_hint<R: Rng + ?Sized>(
    hints: &mut [WordHint],
    word: &str,
    rng: &mut R,
) -> Option<usize> {
    let hidden: Vec<usize> = hints
        .iter()
        .enumerate()
        .filter(|(_, h)| h.is_hidden())
        .map(|(i, _)| i)
        .collect();
    let index = *hidden.choose(rng)?;
    hints[index].character = word.chars().nth(index);
    Some(index)
}

/// Countdown to the next reveal opportunity within one turn.
///
/// Reveals are spaced `drawing_time / 3` seconds apart and there are exactly
/// [`HINT_REVEALS_PER_ROUND`] of them. The countdown starts with the turn,
/// not with the word choice, so a late choice forfeits opportunities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintSchedule {
    interval: u32,
    seconds_until_next: u32,
    reveals_left: u32,
}

impl HintSchedule {
    pub fn new(drawing_time: u32) -> Self {
        let interval = (drawing_time / 3).max(1);
        Self {
            interval,
            seconds_until_next: interval,
            reveals_left: HINT_REVEALS_PER_ROUND,
        }
    }

    /// Advance by one second. Returns true when a reveal opportunity is due.
    pub fn tick(&mut self) -> bool {
        if self.reveals_left == 0 {
            return false;
        }
        self.seconds_until_next -= 1;
        if self.seconds_until_next > 0 {
            return false;
        }
        self.seconds_until_next = self.interval;
        self.reveals_left -= 1;
        true
    }

    pub fn reveals_left(&self) -> u32 {
        self.reveals_left
    }
}

/// Pick up to [`WORD_CHOICE_COUNT`] distinct, unused words.
///
/// Each slot comes from `custom` with probability `custom_chance` percent,
/// otherwise from `corpus`; an exhausted pool falls back to the other.
pub fn random_words<R: Rng + ?Sized>(
    corpus: &[String],
    custom: &[String],
    custom_chance: u8,
    used: &HashSet<String>,
    rng: &mut R,
) -> Vec<String> {
    let mut picked: Vec<String> = Vec::with_capacity(WORD_CHOICE_COUNT);

    for _ in 0..WORD_CHOICE_COUNT {
        let from_custom = !custom.is_empty() && rng.random_range(0..100u8) < custom_chance;
        let (primary, secondary) = if from_custom {
            (custom, corpus)
        } else {
            (corpus, custom)
        };

        let word = pick_unused(primary, used, &picked, rng)
            .or_else(|| pick_unused(secondary, used, &picked, rng));
        match word {
            Some(w) => picked.push(w),
            None => break,
        }
    }

    picked
}

fn pick_unused<R: Rng + ?Sized>(
    pool: &[String],
    used: &HashSet<String>,
    picked: &[String],
    rng: &mut R,
) -> Option<String> {
    let available = |w: &String| !used.contains(w) && !picked.contains(w);

    for _ in 0..PICK_ATTEMPTS {
        let candidate = pool.choose(rng)?;
        if available(candidate) {
            return Some(candidate.clone());
        }
    }

    let remaining: Vec<&String> = pool.iter().filter(|w| available(w)).collect();
    remaining.choose(rng).map(|w| (*w).clone())
}

/// Failure to load a word corpus.
#[derive(Debug, thiserror::Error)]
pub enum WordSourceError {
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),
    #[error("word list for '{language}' is empty")]
    Empty { language: String },
    #[error("failed to read word list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads the word corpus for a language.
pub trait WordSource: Send + Sync {
    fn load(&self, language: &str) -> Result<Vec<String>, WordSourceError>;
}

fn normalize(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Reads `<root>/<language>`, one word per line.
#[derive(Debug, Clone)]
pub struct DirectoryWordSource {
    root: PathBuf,
}

impl DirectoryWordSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl WordSource for DirectoryWordSource {
    fn load(&self, language: &str) -> Result<Vec<String>, WordSourceError> {
        if !is_supported_language(language) {
            return Err(WordSourceError::UnsupportedLanguage(language.to_string()));
        }
        let path = self.root.join(language);
        let raw = std::fs::read_to_string(&path).map_err(|source| WordSourceError::Io {
            path: path.clone(),
            source,
        })?;
        let words = normalize(&raw);
        if words.is_empty() {
            return Err(WordSourceError::Empty {
                language: language.to_string(),
            });
        }
        Ok(words)
    }
}

/// Corpora held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticWordSource {
    corpora: HashMap<String, Vec<String>>,
}

impl StaticWordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: &str, words: &[&str]) -> Self {
        self.corpora
            .insert(language.to_string(), words.iter().map(|w| w.to_lowercase()).collect());
        self
    }
}

impl WordSource for StaticWordSource {
    fn load(&self, language: &str) -> Result<Vec<String>, WordSourceError> {
        let words = self
            .corpora
            .get(language)
            .ok_or_else(|| WordSourceError::UnsupportedLanguage(language.to_string()))?;
        if words.is_empty() {
            return Err(WordSourceError::Empty {
                language: language.to_string(),
            });
        }
        Ok(words.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_hint_separators() {
        let hints = create_word_hint_for("ice-cream cone", false);
        assert_eq!(hints.len(), 14);
        assert!(hints.iter().all(|h| h.is_hidden()));
        assert!(!hints[3].underline);
        assert!(!hints[9].underline);
        assert!(hints[0].underline);

        let shown = create_word_hint_for("ice-cream cone", true);
        assert_eq!(shown[3].character, Some('-'));
        assert_eq!(shown[0].character, Some('i'));
    }

    #[test]
    fn test_hint_length_counts_chars_not_bytes() {
        assert_eq!(create_word_hint_for("über", false).len(), 4);
    }

    #[test]
    fn test_reveal_never_repeats() {
        let mut rng = StdRng::seed_from_u64(7);
        let word = "abc";
        let mut hints = create_word_hint_for(word, false);

        let mut revealed = HashSet::new();
        for _ in 0..3 {
            let index = reveal_random_hint(&mut hints, word, &mut rng).unwrap();
            assert!(revealed.insert(index));
            assert_eq!(hints[index].character, word.chars().nth(index));
        }
        assert_eq!(reveal_random_hint(&mut hints, word, &mut rng), None);
    }

    #[test]
    fn test_schedule_two_reveals() {
        let mut schedule = HintSchedule::new(60);
        let due: Vec<u32> = (1..=60).filter(|_| schedule.tick()).collect();
        assert_eq!(due.len(), 2);
        assert_eq!(schedule.reveals_left(), 0);
    }

    #[test]
    fn test_schedule_spacing() {
        let mut schedule = HintSchedule::new(90);
        let due: Vec<u32> = (1..=90u32).filter(|_| schedule.tick()).collect();
        assert_eq!(due, vec![30, 60]);
    }

    #[test]
    fn test_random_words_distinct_and_unused() {
        let mut rng = StdRng::seed_from_u64(1);
        let corpus = words(&["apple", "banana", "cherry", "date", "elder"]);
        let used: HashSet<String> = ["apple".to_string(), "banana".to_string()].into();

        for _ in 0..20 {
            let picked = random_words(&corpus, &[], 0, &used, &mut rng);
            assert_eq!(picked.len(), 3);
            let unique: HashSet<&String> = picked.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(picked.iter().all(|w| !used.contains(w)));
        }
    }

    #[test]
    fn test_random_words_custom_chance() {
        let mut rng = StdRng::seed_from_u64(2);
        let corpus = words(&["apple", "banana", "cherry", "date"]);
        let custom = words(&["zebra", "yak", "xerus"]);

        let picked = random_words(&corpus, &custom, 100, &HashSet::new(), &mut rng);
        assert!(picked.iter().all(|w| custom.contains(w)));

        let picked = random_words(&corpus, &custom, 0, &HashSet::new(), &mut rng);
        assert!(picked.iter().all(|w| corpus.contains(w)));
    }

    #[test]
    fn test_random_words_falls_back_when_exhausted() {
        let mut rng = StdRng::seed_from_u64(3);
        let corpus = words(&["apple", "banana"]);
        let custom = words(&["zebra"]);

        let picked = random_words(&corpus, &custom, 100, &HashSet::new(), &mut rng);
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0], "zebra");

        let used: HashSet<String> = corpus.iter().cloned().chain(custom.iter().cloned()).collect();
        assert!(random_words(&corpus, &custom, 50, &used, &mut rng).is_empty());
    }

    #[test]
    fn test_static_source() {
        let source = StaticWordSource::new().with_language("english", &["Cat", "dog"]);
        assert_eq!(source.load("english").unwrap(), words(&["cat", "dog"]));
        assert!(matches!(
            source.load("german"),
            Err(WordSourceError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_directory_source_rejects_unknown_language() {
        let source = DirectoryWordSource::new("/nonexistent");
        assert!(matches!(
            source.load("../etc/passwd"),
            Err(WordSourceError::UnsupportedLanguage(_))
        ));
        assert!(matches!(source.load("english"), Err(WordSourceError::Io { .. })));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" Foo \n\nBAR\n"), words(&["foo", "bar"]));
    }
}
