use std::env;

use tracing::warn;

use crate::dialogue::DEFAULT_SECONDS_PER_CHAR;
use crate::transition::DEFAULT_PHASE_SECONDS;
use crate::types::MapName;

pub const START_MAP_ENV_VAR: &str = "OVERWORLD_START_MAP";
pub const AUTOSAVE_ENV_VAR: &str = "OVERWORLD_AUTOSAVE";

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Overrides the catalog's start map for new games.
    pub start_map: Option<MapName>,
    pub autosave_on_reward: bool,
    pub transition_phase_seconds: f32,
    pub text_seconds_per_char: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            start_map: None,
            autosave_on_reward: true,
            transition_phase_seconds: DEFAULT_PHASE_SECONDS,
            text_seconds_per_char: DEFAULT_SECONDS_PER_CHAR,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Result<String, env::VarError>) -> Self {
        let mut config = Self::default();
        if let Some(value) = read_var(&lookup, START_MAP_ENV_VAR) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                config.start_map = Some(MapName::from(trimmed));
            }
        }
        if let Some(value) = read_var(&lookup, AUTOSAVE_ENV_VAR) {
            match parse_flag(&value) {
                Some(enabled) => config.autosave_on_reward = enabled,
                None => warn!(
                    env_var = AUTOSAVE_ENV_VAR,
                    value = value.as_str(),
                    "invalid autosave env var value; falling back to default"
                ),
            }
        }
        config
    }
}

fn read_var(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    key: &'static str,
) -> Option<String> {
    match lookup(key) {
        Ok(value) => Some(value),
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(env_var = key, error = %err, "unable to read env var; falling back to default");
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(
        pairs: &'static [(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Result<String, env::VarError> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .ok_or(env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_without_env() {
        let config = GameConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, GameConfig::default());
        assert!(config.autosave_on_reward);
    }

    #[test]
    fn env_overrides_start_map_and_autosave() {
        let config = GameConfig::from_lookup(lookup_from(&[
            (START_MAP_ENV_VAR, " Street "),
            (AUTOSAVE_ENV_VAR, "off"),
        ]));
        assert_eq!(config.start_map, Some(MapName::from("Street")));
        assert!(!config.autosave_on_reward);
    }

    #[test]
    fn invalid_flag_keeps_default() {
        let config = GameConfig::from_lookup(lookup_from(&[(AUTOSAVE_ENV_VAR, "maybe")]));
        assert!(config.autosave_on_reward);
    }
}
