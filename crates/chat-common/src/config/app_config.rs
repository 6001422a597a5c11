//! Application configuration structs
//!
//! Loads session configuration from environment variables (and `.env`).

use chat_core::{ActorId, LivestreamId, RoomId, StreamerId};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub pusher: PusherConfig,
    pub room: RoomConfig,
    pub reconnect: ReconnectConfig,
    pub auth: AuthConfig,
    /// Optional resilience settings file (presets, breaker, error rates)
    #[serde(default)]
    pub resilience_path: Option<String>,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Pusher endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PusherConfig {
    #[serde(default = "default_pusher_url")]
    pub url: String,
}

/// The room a session binds to, plus the signed-in actor if any
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    pub room_id: RoomId,
    pub streamer_id: StreamerId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub actor_id: Option<ActorId>,
    #[serde(default)]
    pub livestream_id: Option<LivestreamId>,
}

/// Session-level reconnect pacing
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_reconnect_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub multiplier: f64,
    /// Pause between transport open and the first subscribe
    #[serde(default = "default_subscribe_grace")]
    pub subscribe_grace_ms: u64,
    /// Deadline for the room subscription acknowledgment (None = no deadline)
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
}

impl ReconnectConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    #[must_use]
    pub fn subscribe_grace(&self) -> Duration {
        Duration::from_millis(self.subscribe_grace_ms)
    }

    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values that would make the reconnect loop misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_RECONNECT_ATTEMPTS",
                "must be at least 1".to_string(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_BASE_DELAY_MS",
                "must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_MAX_DELAY_MS",
                format!("must be >= base delay ({})", self.base_delay_ms),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_MULTIPLIER",
                format!("must be >= 1, got {}", self.multiplier),
            ));
        }
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_reconnect_base_delay(),
            max_delay_ms: default_reconnect_max_delay(),
            multiplier: default_reconnect_multiplier(),
            subscribe_grace_ms: default_subscribe_grace(),
            handshake_timeout_ms: None,
        }
    }
}

/// Channel authorization endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_endpoint")]
    pub endpoint: String,
    /// Bearer token of the signed-in actor
    #[serde(default)]
    pub token: Option<String>,
}

// Default value functions
fn default_app_name() -> String {
    "chat-realtime".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_pusher_url() -> String {
    "wss://ws-us2.pusher.com/app/32cbd69e4b950bf97679?protocol=7&client=js&version=8.4.0&flash=false"
        .to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay() -> u64 {
    1000
}

fn default_reconnect_max_delay() -> u64 {
    30_000
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_subscribe_grace() -> u64 {
    1000
}

fn default_auth_endpoint() -> String {
    "https://kick.com/broadcasting/auth".to_string()
}

/// Read and parse an optional variable, failing on unparsable values
fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        _ => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let reconnect = ReconnectConfig {
            max_attempts: parse_var("MAX_RECONNECT_ATTEMPTS")?
                .unwrap_or_else(default_max_reconnect_attempts),
            base_delay_ms: parse_var("RECONNECT_BASE_DELAY_MS")?
                .unwrap_or_else(default_reconnect_base_delay),
            max_delay_ms: parse_var("RECONNECT_MAX_DELAY_MS")?
                .unwrap_or_else(default_reconnect_max_delay),
            multiplier: parse_var("RECONNECT_MULTIPLIER")?
                .unwrap_or_else(default_reconnect_multiplier),
            subscribe_grace_ms: parse_var("SUBSCRIBE_GRACE_MS")?
                .unwrap_or_else(default_subscribe_grace),
            handshake_timeout_ms: parse_var("HANDSHAKE_TIMEOUT_MS")?,
        };
        reconnect.validate()?;

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            pusher: PusherConfig {
                url: env::var("PUSHER_URL").unwrap_or_else(|_| default_pusher_url()),
            },
            room: RoomConfig {
                room_id: parse_var("CHATROOM_ID")?.ok_or(ConfigError::MissingVar("CHATROOM_ID"))?,
                streamer_id: parse_var("STREAMER_ID")?
                    .ok_or(ConfigError::MissingVar("STREAMER_ID"))?,
                display_name: env::var("CHATROOM_DISPLAY_NAME").ok(),
                actor_id: parse_var("ACTOR_ID")?,
                livestream_id: parse_var("LIVESTREAM_ID")?,
            },
            reconnect,
            auth: AuthConfig {
                endpoint: env::var("AUTH_ENDPOINT").unwrap_or_else(|_| default_auth_endpoint()),
                token: env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            },
            resilience_path: env::var("RESILIENCE_CONFIG").ok().filter(|p| !p.is_empty()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
