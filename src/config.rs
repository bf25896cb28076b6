//! Application configuration
//!
//! Built once at startup (from the environment or explicitly in tests) and
//! passed into component constructors. Nothing below the binaries reads the
//! environment.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_VERSION: &str = "2024-02-01";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 800;
const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOOL_ROUNDS: u32 = 1;
const DEFAULT_PORT: u16 = 8080;

/// Settings for the completion backend
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for a single completion round
    pub round_timeout: Duration,
    /// Tool rounds allowed per user turn before a final tool-less round
    pub max_tool_rounds: u32,
}

impl CompletionSettings {
    /// Configuration gate: the backend is usable only with both an endpoint
    /// and a deployment name.
    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
        };

        present(&self.endpoint) && present(&self.deployment)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>, deployment: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self.deployment = Some(deployment.into());
        self
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            round_timeout: Duration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Identity the assistant acts as when it writes to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i32,
    pub reviewer_id: i32,
}

impl Default for Principal {
    fn default() -> Self {
        Self {
            user_id: 1,
            reviewer_id: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub completion: CompletionSettings,
    pub database_url: Option<String>,
    pub port: u16,
    pub principal: Principal,
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let completion = CompletionSettings {
            endpoint: first_var(&["AZURE_OPENAI_ENDPOINT", "OPENAI_ENDPOINT"]),
            deployment: first_var(&["AZURE_OPENAI_DEPLOYMENT", "OPENAI_DEPLOYMENT_NAME"]),
            api_key: first_var(&["AZURE_OPENAI_API_KEY"]),
            api_version: first_var(&["AZURE_OPENAI_API_VERSION"])
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            temperature: parse_var("CHAT_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            max_tokens: parse_var("CHAT_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            round_timeout: Duration::from_secs(parse_var(
                "CHAT_ROUND_TIMEOUT_SECS",
                DEFAULT_ROUND_TIMEOUT_SECS,
            )?),
            max_tool_rounds: parse_var("CHAT_MAX_TOOL_ROUNDS", DEFAULT_MAX_TOOL_ROUNDS)?,
        };

        let port = match first_var(&["PORT", "API_PORT"]) {
            Some(value) => parse_value("PORT", &value)?,
            None => DEFAULT_PORT,
        };

        let defaults = Principal::default();
        let principal = Principal {
            user_id: parse_var("ASSISTANT_USER_ID", defaults.user_id)?,
            reviewer_id: parse_var("ASSISTANT_REVIEWER_ID", defaults.reviewer_id)?,
        };

        Ok(Self {
            completion,
            database_url: first_var(&["DATABASE_URL", "POSTGRES_URL"]),
            port,
            principal,
        })
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match first_var(&[name]) {
        Some(value) => parse_value(name, &value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        OrchestrationError::ConfigError(format!("{} has invalid value '{}': {}", name, value, e))
    })
}
