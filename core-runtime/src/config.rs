//! # Application Configuration
//!
//! Environment-driven configuration for the playlist sync engine.
//!
//! ## Overview
//!
//! [`AppConfig::from_env`] reads the process environment once at startup and
//! validates the result before any component is wired. Tests use
//! [`AppConfig::from_lookup`] with a closure over a map, or assemble a config
//! through [`AppConfig::builder`].
//!
//! ## Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | `sqlite://playlist-sync.db` |
//! | `SPOTIFY_CLIENT_ID` / `_SECRET` / `_REDIRECT_URI` | unset |
//! | `YOUTUBE_CLIENT_ID` / `_SECRET` / `_REDIRECT_URI` | unset |
//! | `TIDAL_CLIENT_ID` / `_SECRET` / `_REDIRECT_URI` | unset |
//! | `LLM_ENABLED` | `false` |
//! | `LLM_PROVIDER` | `GEMINI` |
//! | `GEMINI_API_KEY` / `OPENAI_API_KEY` | required for the selected provider |
//! | `SYNC_DEDUP_THRESHOLD` | `90.0` |
//! | `SYNC_SUBSCRIBER_CAPACITY` | `10` |
//! | `SYNC_HEARTBEAT_SECS` | `30` |
//! | `LOG_FORMAT` / `LOG_LEVEL` / `LOG_FILTER` | build dependent / `info` / unset |
//!
//! A provider's OAuth client is configured all-or-none: setting only some of
//! its three variables is a configuration error.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! let config = AppConfig::from_env()?;
//! if let Some(spotify) = config.oauth_client(ProviderKind::Spotify) {
//!     // register the Spotify OAuth flow
//! }
//! ```

use crate::error::{Error, Result};
use crate::logging::LogFormat;
use bridge_traits::log::LogLevel;
use bridge_traits::music::ProviderKind;
use std::time::Duration;
use tracing::warn;

/// Default SQLite database location
pub const DEFAULT_DATABASE_URL: &str = "sqlite://playlist-sync.db";

/// Default merge deduplication threshold (similarity score, 0-100)
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 90.0;

/// Default bounded channel capacity per status subscriber
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 10;

/// Default status stream heartbeat interval
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub spotify: Option<OAuthClientSettings>,
    pub youtube: Option<OAuthClientSettings>,
    pub tidal: Option<OAuthClientSettings>,
    pub llm: LlmSettings,
    pub sync: SyncSettings,
    pub log: LogSettings,
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// SQLite URL or path
    pub url: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
        }
    }
}

/// OAuth client registration for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for OAuthClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// LLM backend used by the metadata normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    Gemini,
    OpenAi,
}

impl LlmProvider {
    /// Parse `GEMINI` / `OPENAI`, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GEMINI" => Some(LlmProvider::Gemini),
            "OPENAI" => Some(LlmProvider::OpenAi),
            _ => None,
        }
    }

    /// Name of the environment variable holding this provider's API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Metadata normalizer settings.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct LlmSettings {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Tunables of the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Similarity score at or above which two merge songs are duplicates
    pub dedup_threshold: f64,
    /// Bounded channel capacity of each status subscription
    pub subscriber_capacity: usize,
    /// Interval at which an idle status stream re-sends the last run
    pub heartbeat: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.dedup_threshold) {
            return Err(Error::Config(format!(
                "Dedup threshold must be within [0, 100], got {}",
                self.dedup_threshold
            )));
        }

        if self.subscriber_capacity == 0 {
            return Err(Error::Config(
                "Subscriber capacity must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat.is_zero() {
            return Err(Error::Config(
                "Heartbeat interval must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

/// Logging settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Raw `EnvFilter` directive overriding the per-crate defaults
    pub filter: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
        }
    }
}

impl AppConfig {
    /// Creates a new builder with every setting at its default.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value is malformed or a provider is
    /// only partially configured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let database = DatabaseSettings {
            url: env
                .string("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            ..DatabaseSettings::default()
        };

        let spotify = env.oauth_client("SPOTIFY")?;
        let youtube = env.oauth_client("YOUTUBE")?;
        let tidal = env.oauth_client("TIDAL")?;

        let llm_enabled = env.boolean("LLM_ENABLED", false);
        let llm_provider = match env.string("LLM_PROVIDER") {
            Some(raw) => LlmProvider::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "LLM_PROVIDER must be GEMINI or OPENAI, got '{}'",
                    raw
                ))
            })?,
            None => LlmProvider::default(),
        };
        let llm = LlmSettings {
            enabled: llm_enabled,
            provider: llm_provider,
            api_key: env.string(llm_provider.api_key_var()),
        };

        let sync = SyncSettings {
            dedup_threshold: env
                .parsed("SYNC_DEDUP_THRESHOLD")?
                .unwrap_or(DEFAULT_DEDUP_THRESHOLD),
            subscriber_capacity: env
                .parsed("SYNC_SUBSCRIBER_CAPACITY")?
                .unwrap_or(DEFAULT_SUBSCRIBER_CAPACITY),
            heartbeat: env
                .parsed::<u64>("SYNC_HEARTBEAT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HEARTBEAT),
        };

        let log = LogSettings {
            format: match env.string("LOG_FORMAT") {
                Some(raw) => LogFormat::parse(&raw).ok_or_else(|| {
                    Error::Config(format!(
                        "LOG_FORMAT must be pretty, json or compact, got '{}'",
                        raw
                    ))
                })?,
                None => LogFormat::default(),
            },
            level: match env.string("LOG_LEVEL") {
                Some(raw) => parse_log_level(&raw).ok_or_else(|| {
                    Error::Config(format!("LOG_LEVEL is not a valid level: '{}'", raw))
                })?,
                None => LogLevel::Info,
            },
            filter: env.string("LOG_FILTER"),
        };

        let config = AppConfig {
            database,
            spotify,
            youtube,
            tidal,
            llm,
            sync,
            log,
        };

        config.validate()?;
        Ok(config)
    }

    /// OAuth client settings for `provider`, if configured.
    pub fn oauth_client(&self, provider: ProviderKind) -> Option<&OAuthClientSettings> {
        match provider {
            ProviderKind::Spotify => self.spotify.as_ref(),
            ProviderKind::YouTube => self.youtube.as_ref(),
            ProviderKind::Tidal => self.tidal.as_ref(),
        }
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.llm.enabled
            && self
                .llm
                .api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "LLM normalization is enabled but {} is not set",
                self.llm.provider.api_key_var()
            )));
        }

        self.sync.validate()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            spotify: None,
            youtube: None,
            tidal: None,
            llm: LlmSettings::default(),
            sync: SyncSettings::default(),
            log: LogSettings::default(),
        }
    }
}

fn parse_log_level(raw: &str) -> Option<LogLevel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

/// Typed access to a variable lookup. Empty values count as unset.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| Error::Config(format!("{} has an invalid value '{}': {}", key, raw, e))),
            None => Ok(None),
        }
    }

    fn boolean(&self, key: &str, fallback: bool) -> bool {
        let Some(raw) = self.string(key) else {
            return fallback;
        };

        match raw.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => true,
            "0" | "f" | "false" | "no" | "off" => false,
            _ => {
                warn!(
                    variable = key,
                    value = %raw,
                    default = fallback,
                    "Could not parse boolean variable, using default"
                );
                fallback
            }
        }
    }

    fn oauth_client(&self, prefix: &str) -> Result<Option<OAuthClientSettings>> {
        let id_key = format!("{}_CLIENT_ID", prefix);
        let secret_key = format!("{}_CLIENT_SECRET", prefix);
        let redirect_key = format!("{}_REDIRECT_URI", prefix);

        match (
            self.string(&id_key),
            self.string(&secret_key),
            self.string(&redirect_key),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Ok(Some(OAuthClientSettings {
                    client_id,
                    client_secret,
                    redirect_uri,
                }))
            }
            (None, None, None) => Ok(None),
            _ => Err(Error::Config(format!(
                "{} OAuth client is partially configured; set {}, {} and {} together",
                prefix, id_key, secret_key, redirect_key
            ))),
        }
    }
}

/// Builder for [`AppConfig`], mostly used by tests and embedders that do
/// not read the environment.
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database.url = url.into();
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.database.max_connections = max;
        self
    }

    /// Registers the OAuth client of `provider`.
    pub fn oauth_client(mut self, provider: ProviderKind, settings: OAuthClientSettings) -> Self {
        match provider {
            ProviderKind::Spotify => self.config.spotify = Some(settings),
            ProviderKind::YouTube => self.config.youtube = Some(settings),
            ProviderKind::Tidal => self.config.tidal = Some(settings),
        }
        self
    }

    pub fn llm(mut self, provider: LlmProvider, api_key: impl Into<String>) -> Self {
        self.config.llm = LlmSettings {
            enabled: true,
            provider,
            api_key: Some(api_key.into()),
        };
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.config.sync = settings;
        self
    }

    pub fn log_settings(mut self, settings: LogSettings) -> Self {
        self.config.log = settings;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<AppConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
        assert!(config.spotify.is_none());
        assert!(!config.llm.enabled);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_full_provider_configuration() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
            ("SPOTIFY_REDIRECT_URI", "http://localhost/callback"),
        ]))
        .unwrap();

        let spotify = config.oauth_client(ProviderKind::Spotify).unwrap();
        assert_eq!(spotify.client_id, "id");
        assert_eq!(spotify.redirect_uri, "http://localhost/callback");
        assert!(config.oauth_client(ProviderKind::Tidal).is_none());
    }

    #[test]
    fn test_partial_provider_configuration_is_rejected() {
        let result = AppConfig::from_lookup(lookup(&[
            ("TIDAL_CLIENT_ID", "id"),
            ("TIDAL_REDIRECT_URI", "http://localhost/callback"),
        ]));

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("TIDAL_CLIENT_SECRET")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_llm_requires_key_for_selected_provider() {
        let result = AppConfig::from_lookup(lookup(&[
            ("LLM_ENABLED", "true"),
            ("LLM_PROVIDER", "openai"),
            ("GEMINI_API_KEY", "wrong-provider-key"),
        ]));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("OPENAI_API_KEY")));

        let config = AppConfig::from_lookup(lookup(&[
            ("LLM_ENABLED", "true"),
            ("LLM_PROVIDER", "OPENAI"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert!(config.llm.enabled);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_boolean_falls_back_to_default() {
        let config = AppConfig::from_lookup(lookup(&[("LLM_ENABLED", "maybe")])).unwrap();
        assert!(!config.llm.enabled);
    }

    #[test]
    fn test_unknown_llm_provider_is_rejected() {
        let result = AppConfig::from_lookup(lookup(&[("LLM_PROVIDER", "claude")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_sync_settings_from_environment() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SYNC_DEDUP_THRESHOLD", "85.5"),
            ("SYNC_SUBSCRIBER_CAPACITY", "4"),
            ("SYNC_HEARTBEAT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.sync.dedup_threshold, 85.5);
        assert_eq!(config.sync.subscriber_capacity, 4);
        assert_eq!(config.sync.heartbeat, Duration::from_secs(5));
    }

    #[test]
    fn test_sync_settings_validation() {
        for vars in [
            [("SYNC_DEDUP_THRESHOLD", "120")],
            [("SYNC_SUBSCRIBER_CAPACITY", "0")],
            [("SYNC_HEARTBEAT_SECS", "0")],
            [("SYNC_SUBSCRIBER_CAPACITY", "ten")],
        ] {
            assert!(
                AppConfig::from_lookup(lookup(&vars)).is_err(),
                "expected {:?} to be rejected",
                vars
            );
        }
    }

    #[test]
    fn test_log_settings_from_environment() {
        let config = AppConfig::from_lookup(lookup(&[
            ("LOG_FORMAT", "json"),
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FILTER", "core_sync=trace"),
        ]))
        .unwrap();

        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.filter.as_deref(), Some("core_sync=trace"));

        assert!(AppConfig::from_lookup(lookup(&[("LOG_LEVEL", "loud")])).is_err());
    }

    #[test]
    fn test_builder() {
        let config = AppConfig::builder()
            .database_url("sqlite::memory:")
            .max_connections(1)
            .oauth_client(
                ProviderKind::YouTube,
                OAuthClientSettings {
                    client_id: "yt".to_string(),
                    client_secret: "s".to_string(),
                    redirect_uri: "http://localhost/yt".to_string(),
                },
            )
            .build()
            .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert!(config.oauth_client(ProviderKind::YouTube).is_some());

        assert!(AppConfig::builder().max_connections(0).build().is_err());
    }

    #[test]
    fn test_secrets_are_not_debug_printed() {
        let settings = OAuthClientSettings {
            client_id: "id".to_string(),
            client_secret: "super-secret".to_string(),
            redirect_uri: "http://localhost".to_string(),
        };
        assert!(!format!("{:?}", settings).contains("super-secret"));

        let llm = LlmSettings {
            enabled: true,
            provider: LlmProvider::Gemini,
            api_key: Some("gemini-key".to_string()),
        };
        assert!(!format!("{:?}", llm).contains("gemini-key"));
    }
}
