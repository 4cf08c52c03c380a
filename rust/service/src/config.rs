//! Service configuration: defaults, then the TOML file named by `BIGTWO_CONFIG`, then
//! `BIGTWO_*` environment overrides.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use bigtwo_engine::rules::Ruleset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV: &str = "BIGTWO_CONFIG";
pub const SEED_ENV: &str = "BIGTWO_SEED";
pub const LEDGER_TIMEOUT_ENV: &str = "BIGTWO_LEDGER_TIMEOUT_MS";
pub const STAKE_OPTIONS_ENV: &str = "BIGTWO_STAKE_OPTIONS";
pub const RECORD_PATH_ENV: &str = "BIGTWO_RECORD_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound for any single ledger call.
    pub ledger_timeout_ms: u64,
    /// Stakes a lobby owner may pick from; always includes 0.
    pub stake_options: Vec<u64>,
    /// Fixed deck seed for reproducible deals.
    pub seed: Option<u64>,
    /// JSONL file finished games are appended to.
    pub record_path: Option<PathBuf>,
    /// Ruleset preset for new tables.
    pub default_rules: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ledger_timeout_ms: 5_000,
            stake_options: vec![0, 10, 50, 100, 500],
            seed: None,
            record_path: None,
            default_rules: "classic".into(),
        }
    }
}

impl ServiceConfig {
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn default_ruleset(&self) -> Ruleset {
        Ruleset::preset(&self.default_rules).unwrap_or_default()
    }

    pub fn allows_stake(&self, stake: u64) -> bool {
        self.stake_options.contains(&stake)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    File,
    Env,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigSources {
    pub ledger_timeout_ms: ValueSource,
    pub stake_options: ValueSource,
    pub seed: ValueSource,
    pub record_path: ValueSource,
    pub default_rules: ValueSource,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            ledger_timeout_ms: ValueSource::Default,
            stake_options: ValueSource::Default,
            seed: ValueSource::Default,
            record_path: ValueSource::Default,
            default_rules: ValueSource::Default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigResolved {
    pub config: ServiceConfig,
    pub sources: ConfigSources,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub fn load() -> Result<ServiceConfig, ConfigError> {
    load_with_sources().map(|resolved| resolved.config)
}

pub fn load_with_sources() -> Result<ConfigResolved, ConfigError> {
    let mut cfg = ServiceConfig::default();
    let mut sources = ConfigSources::default();

    if let Some(path) = env_value(CONFIG_ENV) {
        let text = fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&text)?;
        if let Some(v) = file.ledger_timeout_ms {
            cfg.ledger_timeout_ms = v;
            sources.ledger_timeout_ms = ValueSource::File;
        }
        if let Some(v) = file.stake_options {
            cfg.stake_options = v;
            sources.stake_options = ValueSource::File;
        }
        if let Some(v) = file.seed {
            cfg.seed = Some(v);
            sources.seed = ValueSource::File;
        }
        if let Some(v) = file.record_path {
            cfg.record_path = Some(v);
            sources.record_path = ValueSource::File;
        }
        if let Some(v) = file.default_rules {
            cfg.default_rules = v;
            sources.default_rules = ValueSource::File;
        }
    }

    if let Some(seed) = env_value(SEED_ENV) {
        cfg.seed = Some(
            seed.parse()
                .map_err(|_| ConfigError::Invalid(format!("{SEED_ENV}: invalid seed {seed:?}")))?,
        );
        sources.seed = ValueSource::Env;
    }
    if let Some(ms) = env_value(LEDGER_TIMEOUT_ENV) {
        cfg.ledger_timeout_ms = ms.parse().map_err(|_| {
            ConfigError::Invalid(format!("{LEDGER_TIMEOUT_ENV}: invalid duration {ms:?}"))
        })?;
        sources.ledger_timeout_ms = ValueSource::Env;
    }
    if let Some(list) = env_value(STAKE_OPTIONS_ENV) {
        cfg.stake_options = parse_stake_list(&list)?;
        sources.stake_options = ValueSource::Env;
    }
    if let Some(path) = env_value(RECORD_PATH_ENV) {
        cfg.record_path = Some(PathBuf::from(path));
        sources.record_path = ValueSource::Env;
    }

    validate(&cfg)?;
    Ok(ConfigResolved {
        config: cfg,
        sources,
    })
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    ledger_timeout_ms: Option<u64>,
    #[serde(default)]
    stake_options: Option<Vec<u64>>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    record_path: Option<PathBuf>,
    #[serde(default)]
    default_rules: Option<String>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parses `"0, 10,50"` style lists.
fn parse_stake_list(list: &str) -> Result<Vec<u64>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                ConfigError::Invalid(format!("{STAKE_OPTIONS_ENV}: invalid stake {s:?}"))
            })
        })
        .collect()
}

fn validate(cfg: &ServiceConfig) -> Result<(), ConfigError> {
    if cfg.ledger_timeout_ms == 0 {
        return Err(ConfigError::Invalid("ledger_timeout_ms must be > 0".into()));
    }
    if !cfg.stake_options.contains(&0) {
        return Err(ConfigError::Invalid("stake_options must include 0".into()));
    }
    if Ruleset::preset(&cfg.default_rules).is_none() {
        return Err(ConfigError::Invalid(format!(
            "unknown ruleset preset {:?}",
            cfg.default_rules
        )));
    }
    Ok(())
}
