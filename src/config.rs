use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::prompt;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Paths
    pub data_dir: PathBuf,
    pub resources_dir: PathBuf,

    // Nodo de audio
    pub lavalink: LavalinkSettings,

    // APIs (Opcionales)
    pub genius_token: Option<String>,
    pub google_api_key: Option<String>,

    // Audio
    pub default_volume: u16,
    pub max_queue_size: usize,

    // Tiempos de espera de los prompts
    pub choice_timeout: Duration,
    pub follow_up_timeout: Duration,
    pub queue_view_timeout: Duration,

    // Changelog
    pub repo_dir: PathBuf,
    pub changelog_branch: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LavalinkSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
}

impl Default for LavalinkSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            secure: false,
        }
    }
}

/// Lee una variable de entorno o usa el valor por defecto
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {:?}", name, val)),
        _ => Ok(default),
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn env_secs(name: &str, default: u64) -> Result<Duration> {
    env_or(name, default).map(Duration::from_secs)
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            command_prefix: env_opt("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            // Paths
            data_dir: env_or("DATA_DIR", defaults.data_dir)?,
            resources_dir: env_or("RESOURCES_DIR", defaults.resources_dir)?,

            lavalink: LavalinkSettings {
                host: env_opt("LAVALINK_HOST").unwrap_or(defaults.lavalink.host),
                port: env_or("LAVALINK_PORT", defaults.lavalink.port)?,
                password: env_opt("LAVALINK_PASSWORD").unwrap_or(defaults.lavalink.password),
                secure: env_or("LAVALINK_SECURE", defaults.lavalink.secure)?,
            },

            genius_token: env_opt("GENIUS_TOKEN"),
            google_api_key: env_opt("GOOGLE_API_KEY"),

            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            choice_timeout: env_secs("CHOICE_TIMEOUT", defaults.choice_timeout.as_secs())?,
            follow_up_timeout: env_secs("FOLLOW_UP_TIMEOUT", defaults.follow_up_timeout.as_secs())?,
            queue_view_timeout: env_secs(
                "QUEUE_VIEW_TIMEOUT",
                defaults.queue_view_timeout.as_secs(),
            )?,

            repo_dir: env_or("REPO_DIR", defaults.repo_dir)?,
            changelog_branch: env_opt("CHANGELOG_BRANCH").unwrap_or(defaults.changelog_branch),
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("No se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The command prefix must not be empty or contain whitespace
    /// - Volume must be between 1 and 1000
    /// - Queue size and prompt timeouts must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.is_empty() || self.command_prefix.contains(char::is_whitespace) {
            anyhow::bail!("Command prefix must be non-empty without spaces, got: {:?}", self.command_prefix);
        }

        if !(1..=1000).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 1 and 1000, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        for (name, timeout) in [
            ("CHOICE_TIMEOUT", self.choice_timeout),
            ("FOLLOW_UP_TIMEOUT", self.follow_up_timeout),
            ("QUEUE_VIEW_TIMEOUT", self.queue_view_timeout),
        ] {
            if timeout.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and passwords are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Lavalink: {}:{} (tls={})\n  \
            Audio: {}% vol, {} queue\n  \
            Prompts: {}s choice, {}s follow-up, {}s queue view\n  \
            APIs: Genius={}, Google={}",
            self.command_prefix,
            self.lavalink.host,
            self.lavalink.port,
            self.lavalink.secure,
            self.default_volume,
            self.max_queue_size,
            self.choice_timeout.as_secs(),
            self.follow_up_timeout.as_secs(),
            self.queue_view_timeout.as_secs(),
            self.genius_token.is_some(),
            self.google_api_key.is_some(),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            data_dir: "./data".into(),
            resources_dir: "./resources".into(),

            lavalink: LavalinkSettings::default(),

            genius_token: None,
            google_api_key: None,

            default_volume: 100,
            max_queue_size: 1000,

            choice_timeout: prompt::DEFAULT_CHOICE_TIMEOUT,
            follow_up_timeout: prompt::DEFAULT_FOLLOW_UP_TIMEOUT,
            queue_view_timeout: Duration::from_secs(1200),

            repo_dir: ".".into(),
            changelog_branch: "master".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn prompt_timeouts_default_to_controller_values() {
        let config = Config::default();
        assert_eq!(config.choice_timeout, Duration::from_secs(30));
        assert_eq!(config.follow_up_timeout, Duration::from_secs(60));
    }

    #[test]
    fn rejects_bad_prefix() {
        let mut config = Config::default();
        config.command_prefix = String::new();
        assert!(config.validate().is_err());

        config.command_prefix = "m !".to_string();
        assert!(config.validate().is_err());

        config.command_prefix = "mp!".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let mut config = Config::default();
        config.default_volume = 0;
        assert!(config.validate().is_err());
        config.default_volume = 1001;
        assert!(config.validate().is_err());
        config.default_volume = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_limits() {
        let mut config = Config::default();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.follow_up_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_secrets() {
        let mut config = Config::default();
        config.discord_token = "super-secret-token".to_string();
        config.lavalink.password = "hunter2".to_string();

        let summary = config.summary();
        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("hunter2"));
        assert!(summary.contains("localhost:2333"));
    }
}
