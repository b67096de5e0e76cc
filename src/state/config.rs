//! Lobby configuration and the bounds enforced on it.

use serde::{Deserialize, Serialize};

use super::lobby::LobbyError;

/// Lower and upper bounds for the owner-supplied lobby settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingBounds {
    pub min_drawing_time: u32,
    pub max_drawing_time: u32,
    pub min_rounds: u32,
    pub max_rounds: u32,
    pub min_max_players: usize,
    pub max_max_players: usize,
    pub min_clients_per_ip_limit: usize,
    pub max_clients_per_ip_limit: usize,
    pub max_custom_word_chance: u8,
}

pub const LOBBY_SETTING_BOUNDS: SettingBounds = SettingBounds {
    min_drawing_time: 60,
    max_drawing_time: 300,
    min_rounds: 1,
    max_rounds: 20,
    min_max_players: 2,
    max_max_players: 24,
    min_clients_per_ip_limit: 1,
    max_clients_per_ip_limit: 24,
    max_custom_word_chance: 100,
};

/// Languages with a word corpus, keyed by the identifier clients send.
pub const SUPPORTED_LANGUAGES: [(&str, &str); 3] = [
    ("english", "English"),
    ("italian", "Italian"),
    ("german", "German"),
];

/// Display names are cut to this many characters.
pub const MAX_NAME_LENGTH: usize = 30;

/// Number of words offered to the drawer each turn.
pub const WORD_CHOICE_COUNT: usize = 3;

/// Characters revealed to guessers over the course of one turn.
pub const HINT_REVEALS_PER_ROUND: u32 = 2;

/// Period of the round timer.
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Check whether a language has a word corpus.
pub fn is_supported_language(language: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(key, _)| *key == language)
}

/// Settings chosen by the lobby owner at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LobbySettings {
    pub language: String,
    /// Seconds per turn
    pub drawing_time: u32,
    pub rounds: u32,
    pub max_players: usize,
    /// Percent chance that a word candidate is drawn from `custom_words`
    pub custom_word_chance: u8,
    pub clients_per_ip_limit: usize,
    pub enable_votekick: bool,
    pub custom_words: Vec<String>,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            drawing_time: 120,
            rounds: 4,
            max_players: 12,
            custom_word_chance: 50,
            clients_per_ip_limit: 1,
            enable_votekick: true,
            custom_words: Vec::new(),
        }
    }
}

impl LobbySettings {
    /// Check every field against [`LOBBY_SETTING_BOUNDS`] and normalize the
    /// custom word list.
    pub fn validate(mut self) -> Result<Self, LobbyError> {
        let b = LOBBY_SETTING_BOUNDS;

        if !is_supported_language(&self.language) {
            return Err(LobbyError::UnsupportedLanguage(self.language));
        }
        check_range(
            "drawingTime",
            self.drawing_time as i64,
            b.min_drawing_time as i64,
            b.max_drawing_time as i64,
        )?;
        check_range("rounds", self.rounds as i64, b.min_rounds as i64, b.max_rounds as i64)?;
        check_range(
            "maxPlayers",
            self.max_players as i64,
            b.min_max_players as i64,
            b.max_max_players as i64,
        )?;
        check_range(
            "clientsPerIpLimit",
            self.clients_per_ip_limit as i64,
            b.min_clients_per_ip_limit as i64,
            b.max_clients_per_ip_limit as i64,
        )?;
        check_range(
            "customWordChance",
            self.custom_word_chance as i64,
            0,
            b.max_custom_word_chance as i64,
        )?;

        let mut seen = std::collections::HashSet::new();
        self.custom_words = self
            .custom_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty() && seen.insert(w.clone()))
            .collect();

        Ok(self)
    }
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), LobbyError> {
    if value < min || value > max {
        return Err(LobbyError::InvalidSetting { field, value, min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let settings = LobbySettings::default().validate().unwrap();
        assert_eq!(settings.drawing_time, 120);
        assert!(settings.enable_votekick);
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: LobbySettings =
            serde_json::from_str(r#"{"drawingTime": 90, "customWords": [" Foo ", "", "bar"]}"#).unwrap();
        let settings = settings.validate().unwrap();
        assert_eq!(settings.drawing_time, 90);
        assert_eq!(settings.rounds, 4);
        assert_eq!(settings.custom_words, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn test_out_of_bounds() {
        let settings = LobbySettings {
            drawing_time: 59,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(LobbyError::InvalidSetting { field: "drawingTime", .. })
        ));

        let settings = LobbySettings {
            max_players: 25,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = LobbySettings {
            custom_word_chance: 101,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unsupported_language() {
        let settings = LobbySettings {
            language: "klingon".to_string(),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(LobbyError::UnsupportedLanguage(_))));
    }
}
