// Configuration loading and parsing (config/scoring.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// scoring.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire scoring.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    scoring: ScoringConfig,
    store: StoreConfig,
    #[serde(default)]
    roster: RosterConfig,
    #[serde(default)]
    bracket: BracketConfig,
}

/// The assembled configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub roster: RosterConfig,
    pub bracket: BracketConfig,
}

/// Payout and bonus amounts for challenge finalization.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Slot values for 1st place, 2nd place, ... A multiplier passed at
    /// finalize time scales the whole table for higher-stakes events.
    pub payout_table: Vec<f64>,
    /// Fixed bonus for outscoring the reference participant (never scaled).
    pub reference_bonus: f64,
    /// Fixed bonus for every member of a weekly challenge's winning tie-group.
    pub weekly_bonus: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    /// Store path of the participant roster documents.
    pub path: String,
}

impl Default for RosterConfig {
    fn default() -> Self {
        RosterConfig {
            path: "roster".to_string(),
        }
    }
}

/// Bracket scoring rules: per-round point values and the declared
/// futures-category mapping. Futures are declared explicitly (category ->
/// matchup id) rather than inferred from identifier naming conventions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BracketConfig {
    #[serde(default)]
    pub rounds: Vec<RoundRule>,
    #[serde(default)]
    pub futures: Vec<FuturesRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoundRule {
    pub round: String,
    pub points: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuturesRule {
    /// Category label the futures pick is keyed by (e.g. "east_champion").
    pub category: String,
    /// The matchup whose recorded winner settles this category.
    pub matchup: String,
    pub points: f64,
}

impl BracketConfig {
    pub fn round_points(&self, round: &str) -> Option<f64> {
        self.rounds
            .iter()
            .find(|rule| rule.round == round)
            .map(|rule| rule.points)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/scoring.toml` relative to
/// the given `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("scoring.toml");
    let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
        path: path.clone(),
    })?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        scoring: file.scoring,
        store: file.store,
        roster: file.roster,
        bracket: file.bracket,
    };

    validate(&config)?;

    Ok(config)
}

/// Convenience wrapper: loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.scoring.payout_table.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "scoring.payout_table".into(),
            message: "must contain at least one slot value".into(),
        });
    }
    for (i, &value) in config.scoring.payout_table.iter().enumerate() {
        if value < 0.0 {
            return Err(ConfigError::ValidationError {
                field: format!("scoring.payout_table[{i}]"),
                message: format!("must be >= 0, got {value}"),
            });
        }
    }

    if config.scoring.reference_bonus <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "scoring.reference_bonus".into(),
            message: format!("must be > 0, got {}", config.scoring.reference_bonus),
        });
    }
    if config.scoring.weekly_bonus <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "scoring.weekly_bonus".into(),
            message: format!("must be > 0, got {}", config.scoring.weekly_bonus),
        });
    }

    if config.store.db_path.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "store.db_path".into(),
            message: "must not be empty".into(),
        });
    }
    if config.roster.path.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "roster.path".into(),
            message: "must not be empty".into(),
        });
    }

    let mut seen_rounds: Vec<&str> = Vec::new();
    for rule in &config.bracket.rounds {
        if rule.points <= 0.0 {
            return Err(ConfigError::ValidationError {
                field: format!("bracket.rounds.{}", rule.round),
                message: format!("points must be > 0, got {}", rule.points),
            });
        }
        if seen_rounds.contains(&rule.round.as_str()) {
            return Err(ConfigError::ValidationError {
                field: format!("bracket.rounds.{}", rule.round),
                message: "duplicate round name".into(),
            });
        }
        seen_rounds.push(&rule.round);
    }

    let mut seen_categories: Vec<&str> = Vec::new();
    for rule in &config.bracket.futures {
        if rule.points <= 0.0 {
            return Err(ConfigError::ValidationError {
                field: format!("bracket.futures.{}", rule.category),
                message: format!("points must be > 0, got {}", rule.points),
            });
        }
        if seen_categories.contains(&rule.category.as_str()) {
            return Err(ConfigError::ValidationError {
                field: format!("bracket.futures.{}", rule.category),
                message: "duplicate futures category".into(),
            });
        }
        seen_categories.push(&rule.category);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
