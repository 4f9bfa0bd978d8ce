//! Runtime configuration loaded from the environment (and `.env` via dotenv)

use crate::error::FintrackError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_ITERATIONS: usize = 8;
pub const DEFAULT_CONTEXT_MAX_TOKENS: usize = 8000;

/// Headers set by the identity-aware proxy in front of `/auth/callback`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub email_header: String,
    pub name_header: String,
    pub logout_url: Option<String>,
    pub client_id: Option<String>,
    pub cookie_name: String,
    pub home_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email_header: "x-auth-request-email".to_string(),
            name_header: "x-auth-request-user".to_string(),
            logout_url: None,
            client_id: None,
            cookie_name: "fintrack_session".to_string(),
            home_url: "/".to_string(),
        }
    }
}

/// Knobs shared by every chat session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub flush_threshold: usize,
    pub currency: String,
    pub timezone: String,
    pub turn_timeout: Duration,
    pub context_max_tokens: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            currency: "BDT".to_string(),
            timezone: "UTC".to_string(),
            turn_timeout: Duration::from_secs(DEFAULT_TURN_TIMEOUT_SECS),
            context_max_tokens: DEFAULT_CONTEXT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub database_url: Option<String>,
    pub port: u16,
    pub tool_timeout: Duration,
    pub max_iterations: usize,
    pub session: SessionSettings,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            database_url: None,
            port: DEFAULT_PORT,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            session: SessionSettings::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let flush_threshold: usize = parse_or(&get, "STREAM_FLUSH_THRESHOLD", DEFAULT_FLUSH_THRESHOLD)?;
        if flush_threshold == 0 {
            return Err(FintrackError::Config(
                "STREAM_FLUSH_THRESHOLD must be greater than zero".to_string(),
            ));
        }

        let session = SessionSettings {
            flush_threshold,
            currency: get("APP_CURRENCY").unwrap_or(defaults.session.currency),
            timezone: get("APP_TIMEZONE").unwrap_or(defaults.session.timezone),
            turn_timeout: Duration::from_secs(parse_or(
                &get,
                "TURN_TIMEOUT_SECS",
                DEFAULT_TURN_TIMEOUT_SECS,
            )?),
            context_max_tokens: parse_or(&get, "CONTEXT_MAX_TOKENS", DEFAULT_CONTEXT_MAX_TOKENS)?,
        };

        let auth = AuthConfig {
            email_header: get("AUTH_EMAIL_HEADER").unwrap_or(defaults.auth.email_header),
            name_header: get("AUTH_NAME_HEADER").unwrap_or(defaults.auth.name_header),
            logout_url: get("AUTH_LOGOUT_URL"),
            client_id: get("AUTH_CLIENT_ID"),
            cookie_name: get("SESSION_COOKIE_NAME").unwrap_or(defaults.auth.cookie_name),
            home_url: get("AUTH_HOME_URL").unwrap_or(defaults.auth.home_url),
        };

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| FintrackError::Config(format!("PORT is not a valid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            port,
            tool_timeout: Duration::from_secs(parse_or(
                &get,
                "TOOL_TIMEOUT_SECS",
                DEFAULT_TOOL_TIMEOUT_SECS,
            )?),
            max_iterations: parse_or(&get, "AGENT_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS)?,
            session,
            auth,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FintrackError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.session.flush_threshold, 50);
        assert_eq!(config.session.currency, "BDT");
        assert!(config.database_url.is_none());
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let config = AppConfig::from_lookup(lookup(&[
            ("API_PORT", "9000"),
            ("POSTGRES_URL", "postgres://localhost/fintrack"),
            ("STREAM_FLUSH_THRESHOLD", "500"),
            ("GEMINI_API_KEY", ""),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/fintrack"));
        assert_eq!(config.session.flush_threshold, 500);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        let result = AppConfig::from_lookup(lookup(&[("TURN_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(FintrackError::Config(_))));

        let result = AppConfig::from_lookup(lookup(&[("STREAM_FLUSH_THRESHOLD", "0")]));
        assert!(matches!(result, Err(FintrackError::Config(_))));
    }
}
