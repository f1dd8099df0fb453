use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::error::{ChatError, Result};

const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000";
const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
const DEFAULT_REFETCH_DEBOUNCE_MS: u64 = 250;

/// Runtime settings for the chat client
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub socket_url: String,
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Reconnection attempts after a drop before giving up
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Window in which re-fetch requests are coalesced into one
    pub refetch_debounce: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            refetch_debounce: Duration::from_millis(DEFAULT_REFETCH_DEBOUNCE_MS),
        }
    }
}

impl ChatConfig {
    /// Build the config from the environment.
    ///
    /// Priority for each value: build-time env -> runtime env (including `.env`) -> default.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!(error = %e, "Failed to load .env file");
            }
        }

        let socket_url = resolve(option_env!("BOOKBACK_SOCKET_URL"), "BOOKBACK_SOCKET_URL")
            .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string());
        let api_base_url = resolve(option_env!("BOOKBACK_API_URL"), "BOOKBACK_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_token = resolve(option_env!("BOOKBACK_API_TOKEN"), "BOOKBACK_API_TOKEN")
            .filter(|t| !t.is_empty());

        let reconnect_attempts = parse_attempts(
            resolve(
                option_env!("BOOKBACK_RECONNECT_ATTEMPTS"),
                "BOOKBACK_RECONNECT_ATTEMPTS",
            ),
            "BOOKBACK_RECONNECT_ATTEMPTS",
        )?
        .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS);
        let reconnect_delay_ms = parse_number(
            resolve(
                option_env!("BOOKBACK_RECONNECT_DELAY_MS"),
                "BOOKBACK_RECONNECT_DELAY_MS",
            ),
            "BOOKBACK_RECONNECT_DELAY_MS",
        )?
        .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
        let refetch_debounce_ms = parse_number(
            resolve(
                option_env!("BOOKBACK_REFETCH_DEBOUNCE_MS"),
                "BOOKBACK_REFETCH_DEBOUNCE_MS",
            ),
            "BOOKBACK_REFETCH_DEBOUNCE_MS",
        )?
        .unwrap_or(DEFAULT_REFETCH_DEBOUNCE_MS);

        let config = Self {
            socket_url,
            api_base_url,
            api_token,
            reconnect_attempts,
            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            refetch_debounce: Duration::from_millis(refetch_debounce_ms),
        };
        config.validate()?;

        info!(
            socket = %config.socket_url,
            api = %config.api_base_url,
            attempts = config.reconnect_attempts,
            "Loaded chat configuration"
        );
        Ok(config)
    }

    /// Check that both endpoints are well-formed URLs with the expected schemes
    pub fn validate(&self) -> Result<()> {
        let socket = Url::parse(&self.socket_url)
            .map_err(|e| ChatError::Config(format!("socket url {}: {}", self.socket_url, e)))?;
        if !matches!(socket.scheme(), "ws" | "wss") {
            return Err(ChatError::Config(format!(
                "socket url must use ws or wss, got {}",
                socket.scheme()
            )));
        }

        let api = Url::parse(&self.api_base_url)
            .map_err(|e| ChatError::Config(format!("api url {}: {}", self.api_base_url, e)))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "api url must use http or https, got {}",
                api.scheme()
            )));
        }
        Ok(())
    }
}

fn resolve(build_time: Option<&'static str>, key: &str) -> Option<String> {
    build_time
        .map(String::from)
        .or_else(|| std::env::var(key).ok())
}

fn parse_number(value: Option<String>, key: &str) -> Result<Option<u64>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| ChatError::Config(format!("{} = {:?}: {}", key, v, e)))
        })
        .transpose()
}

fn parse_attempts(value: Option<String>, key: &str) -> Result<Option<u32>> {
    parse_number(value, key)?
        .map(|n| {
            u32::try_from(n)
                .map_err(|_| ChatError::Config(format!("{} = {} exceeds {}", key, n, u32::MAX)))
        })
        .transpose()
}
