//! Configuration structs

mod app_config;
mod resilience;

pub use app_config::{
    AppConfig, AppSettings, AuthConfig, ConfigError, Environment, PusherConfig, ReconnectConfig,
    RoomConfig,
};
pub use resilience::{
    BreakerSettings, ErrorLogSettings, ErrorRateSettings, PresetSettings, RateThreshold,
    ResilienceSettings, SettingsError, DEFAULT_PRESET,
};
