use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::secret::SecretRng;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Runtime configuration, built once at startup and read-only afterwards.
pub struct Config {
    pub port: u16,
    /// Bot API base URL including the credential, ending in `/`.
    pub base_url: String,
    /// Public URL the Bot API delivers updates to.
    pub bot_url: String,
    pub debug: bool,
    pub secret_rng: SecretRng,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("base_url", &"[REDACTED]")
            .field("bot_url", &self.bot_url)
            .field("debug", &self.debug)
            .field("secret_rng", &self.secret_rng)
            .finish()
    }
}

/// Optional TOML file. Every key may be overridden from the environment.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bot_token: Option<String>,
    pub bot_url: Option<String>,
    pub port: Option<u16>,
    pub api_url: Option<String>,
    pub debug: Option<bool>,
    pub secret_rng: Option<SecretRng>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

impl Config {
    /// Load from the optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => FileConfig::load(p)?,
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a file config with an environment lookup; the environment wins.
    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let token = var("BOT_TOKEN")
            .or(file.bot_token)
            .filter(|v| !v.trim().is_empty())
            .context("missing BOT_TOKEN environment variable")?;

        let bot_url = var("BOT_URL")
            .or(file.bot_url)
            .filter(|v| !v.trim().is_empty())
            .context("missing BOT_URL environment variable")?;

        let port = match var("PORT") {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid PORT value: {}", p))?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let api_url = var("API_URL")
            .or(file.api_url)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let debug = match var("DEBUG") {
            Some(v) => parse_flag(&v),
            None => file.debug.unwrap_or(false),
        };

        let secret_rng = match var("SECRET_RNG") {
            Some(v) => v
                .parse::<SecretRng>()
                .context("invalid SECRET_RNG value")?,
            None => file.secret_rng.unwrap_or_default(),
        };

        Ok(Config {
            port,
            base_url: format!("{}/bot{}/", api_url.trim_end_matches('/'), token),
            bot_url,
            debug,
            secret_rng,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
