use crate::error::ConfigError;
use std::env;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TRIGGER: &str = "finbot";
pub const DEFAULT_API_BASE: &str = "https://api.line.me";

#[derive(Clone)]
pub struct Config {
    pub channel_secret: String,
    pub access_token: String,
    pub port: u16,
    pub trigger: String,
    pub api_base: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };
        let channel_secret = required("LINE_CHANNEL_SECRET")?;
        let access_token = required("LINE_CHANNEL_ACCESS_TOKEN")?;

        let port = match lookup("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidPort(port))?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            channel_secret,
            access_token,
            port,
            trigger: lookup("FINBOT_TRIGGER")
                .map(|trigger| trigger.trim().to_string())
                .filter(|trigger| !trigger.is_empty())
                .unwrap_or_else(|| DEFAULT_TRIGGER.to_string()),
            api_base: lookup("LINE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }
}

// Keeps secrets out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("trigger", &self.trigger)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}
