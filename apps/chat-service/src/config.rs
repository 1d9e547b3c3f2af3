//! Environment configuration, loaded once and validated fail-fast.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use cadence_slack::config::{ChannelRef, SlackAuthConfig, SlackConfig};

/// Default sync cadence: every 15 minutes.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;

/// Default reminder poll cadence.
const DEFAULT_REMINDER_POLL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {name} is not set")]
    MissingVar { name: &'static str },

    #[error("environment variable {name} is invalid: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// Deployment environment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Parse `APP_ENV`; anything unrecognized falls back to development.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: AppEnvironment,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub database_url: String,
    pub sync_interval: Duration,
    pub reminder_poll_interval: Duration,
    pub slack: SlackConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_env = AppEnvironment::from_env_str(&var_or("APP_ENV", "development"));
        let host = var_or("HOST", "0.0.0.0");
        let port = parse_var("PORT", 8080)?;
        let rust_log = var_or("RUST_LOG", "info,chat_service=debug");
        let database_url = required("DATABASE_URL")?;

        let sync_interval =
            Duration::from_secs(parse_var("SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL_SECS)?);
        let reminder_poll_interval =
            Duration::from_secs(parse_var("REMINDER_POLL_SECS", DEFAULT_REMINDER_POLL_SECS)?);

        let channel_value = optional("SLACK_CHANNEL_ID")
            .or_else(|| optional("SLACK_CHANNEL"))
            .ok_or(ConfigError::MissingVar {
                name: "SLACK_CHANNEL_ID",
            })?;
        let frontend_url = var_or("FRONTEND_URL", "https://app.cadence.team");

        // Login stays optional: without credentials the feature is disabled,
        // not the service.
        let auth =
            SlackAuthConfig::from_values(optional("SLACK_CLIENT_ID"), optional("SLACK_CLIENT_SECRET"))
                .ok();

        let mut slack = SlackConfig::new(auth, ChannelRef::parse(&channel_value), frontend_url);
        slack.redirect_override = optional("SLACK_REDIRECT_URI");
        slack.bot_token = optional("SLACK_BOT_TOKEN");
        slack.org_bot_tokens = match optional("SLACK_BOT_TOKENS") {
            Some(json) => parse_bot_tokens(&json)?,
            None => HashMap::new(),
        };
        slack.private_channel_id = optional("SLACK_PRIVATE_CHANNEL_ID");
        slack.billing_webhook_url = optional("BILLING_WEBHOOK_URL");

        Ok(Self {
            app_env,
            host,
            port,
            rust_log,
            database_url,
            sync_interval,
            reminder_poll_interval,
            slack,
        })
    }
}

/// Parse the `SLACK_BOT_TOKENS` JSON object (`{"slug": "xoxb-…"}`).
fn parse_bot_tokens(json: &str) -> Result<HashMap<String, String>, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::InvalidVar {
        name: "SLACK_BOT_TOKENS",
        reason: e.to_string(),
    })
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar { name })
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_environment_parsing() {
        assert_eq!(
            AppEnvironment::from_env_str("production"),
            AppEnvironment::Production
        );
        assert_eq!(
            AppEnvironment::from_env_str("PROD"),
            AppEnvironment::Production
        );
        assert_eq!(
            AppEnvironment::from_env_str("anything-else"),
            AppEnvironment::Development
        );
    }

    #[test]
    fn test_parse_bot_tokens() {
        let tokens =
            parse_bot_tokens(r#"{"acme": "xoxb-1", "globex": "xoxb-2"}"#).unwrap();
        assert_eq!(tokens.get("acme").map(String::as_str), Some("xoxb-1"));
        assert_eq!(tokens.len(), 2);

        assert!(parse_bot_tokens("not json").is_err());
    }
}
