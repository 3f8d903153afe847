//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.relay/config.json`) and environment.
//! Service credentials normally come from the environment (or a local `.env` file); the file
//! only carries overrides such as API base URLs and dispatch options.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var holding the Slack bot token.
pub const SLACK_TOKEN_ENV: &str = "SLACK_ACCESS_TOKEN";
/// Env var holding the Wit.ai server access token.
pub const WIT_TOKEN_ENV: &str = "WIT_AI_SERVER_ACCESS_TOKEN";
/// Env var holding the Wolfram|Alpha app id. The spelling is part of the deployment contract.
pub const WOLFRAM_APP_ID_ENV: &str = "WOLFARM_APP_ID";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Slack (chat platform) settings.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Wit.ai (intent service) settings.
    #[serde(default)]
    pub wit: WitConfig,

    /// Wolfram|Alpha (knowledge service) settings.
    #[serde(default)]
    pub wolfram: WolframConfig,

    /// Reply dispatch options.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Slack settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token. Overridden by SLACK_ACCESS_TOKEN env when set.
    pub access_token: Option<String>,
    /// Web API base (default https://slack.com/api).
    pub api_base: Option<String>,
}

/// Wit.ai settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitConfig {
    /// Server access token. Overridden by WIT_AI_SERVER_ACCESS_TOKEN env when set.
    pub server_access_token: Option<String>,
    /// API base (default https://api.wit.ai).
    pub api_base: Option<String>,
    /// Value of the `v` query parameter; pins the response format.
    pub api_version: Option<String>,
}

/// Wolfram|Alpha settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WolframConfig {
    /// App id. Overridden by WOLFARM_APP_ID env when set.
    pub app_id: Option<String>,
    /// API base (default https://api.wolframalpha.com).
    pub api_base: Option<String>,
}

/// Dispatch options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Upper bound on messages processed concurrently. Unset means unbounded.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// When true, a failed knowledge query posts the fallback reply instead of staying silent.
    #[serde(default)]
    pub fallback_on_knowledge_error: bool,
}

/// The three service credentials, all required to run the bot.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub slack_token: String,
    pub wit_token: String,
    pub wolfram_app_id: String,
}

/// Outcome of loading a `.env` file. Loading happens before the logger is initialised (so
/// `RUST_LOG` may come from the file); call [`EnvFile::log`] once logging is up.
#[derive(Debug)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing,
    Failed(String),
}

impl EnvFile {
    pub fn log(&self) {
        match self {
            EnvFile::Loaded(path) => log::debug!("loaded environment from {}", path.display()),
            EnvFile::Missing => log::info!("No .env file found"),
            EnvFile::Failed(e) => log::warn!("failed to load .env file: {}", e),
        }
    }
}

fn env_file_status(res: dotenvy::Result<PathBuf>) -> EnvFile {
    match res {
        Ok(path) => EnvFile::Loaded(path),
        Err(e) if e.not_found() => EnvFile::Missing,
        Err(e) => EnvFile::Failed(e.to_string()),
    }
}

/// Load a `.env` file from the working directory or its ancestors into the process environment.
/// Absence is not an error.
pub fn load_env_file() -> EnvFile {
    env_file_status(dotenvy::dotenv())
}

/// Load a specific env file into the process environment.
pub fn load_env_file_from(path: &Path) -> EnvFile {
    env_file_status(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

/// Trimmed, non-empty env var value.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Slack token: env SLACK_ACCESS_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config) -> Option<String> {
    env_non_empty(SLACK_TOKEN_ENV).or_else(|| config_non_empty(config.slack.access_token.as_ref()))
}

/// Resolve the Wit.ai token: env WIT_AI_SERVER_ACCESS_TOKEN overrides config.
pub fn resolve_wit_token(config: &Config) -> Option<String> {
    env_non_empty(WIT_TOKEN_ENV)
        .or_else(|| config_non_empty(config.wit.server_access_token.as_ref()))
}

/// Resolve the Wolfram app id: env WOLFARM_APP_ID overrides config.
pub fn resolve_wolfram_app_id(config: &Config) -> Option<String> {
    env_non_empty(WOLFRAM_APP_ID_ENV).or_else(|| config_non_empty(config.wolfram.app_id.as_ref()))
}

/// Resolve all credentials, naming every missing variable in the error.
pub fn resolve_credentials(config: &Config) -> Result<Credentials> {
    let slack = resolve_slack_token(config);
    let wit = resolve_wit_token(config);
    let wolfram = resolve_wolfram_app_id(config);
    let missing: Vec<&str> = [
        (slack.is_none(), SLACK_TOKEN_ENV),
        (wit.is_none(), WIT_TOKEN_ENV),
        (wolfram.is_none(), WOLFRAM_APP_ID_ENV),
    ]
    .iter()
    .filter(|(absent, _)| *absent)
    .map(|(_, name)| *name)
    .collect();
    match (slack, wit, wolfram) {
        (Some(slack_token), Some(wit_token), Some(wolfram_app_id)) => Ok(Credentials {
            slack_token,
            wit_token,
            wolfram_app_id,
        }),
        _ => anyhow::bail!("missing credentials: {}", missing.join(", ")),
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, the default path, or RELAY_CONFIG_PATH. Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
