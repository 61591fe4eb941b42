//! Resolution of the AI endpoint used by the generation controller.

pub mod openai;

use crate::core::config::Config;
use std::error::Error;
use std::fmt;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

const QUICK_FIXES: &[&str] = &[
    "export OPENAI_API_KEY=sk-...           # Required for AI mode",
    "simpl set ai.base_url <url>            # Use an OpenAI-compatible endpoint",
    "simpl set ai.model <name>              # Choose the model",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSession {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub provider_display_name: String,
}

#[derive(Debug)]
pub struct ProviderResolutionError {
    message: String,
    quick_fixes: &'static [&'static str],
    exit_code: i32,
}

impl ProviderResolutionError {
    pub fn missing_authentication() -> Self {
        Self {
            message: "OPENAI_API_KEY environment variable not set; AI mode is unavailable"
                .to_string(),
            quick_fixes: QUICK_FIXES,
            exit_code: 2,
        }
    }

    pub fn quick_fixes(&self) -> &'static [&'static str] {
        self.quick_fixes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}

/// Resolve the endpoint from the process environment and `[ai]` config.
pub fn resolve_session(
    config: &Config,
    model_override: Option<&str>,
) -> Result<ProviderSession, ProviderResolutionError> {
    resolve_session_with(config, model_override, |name| std::env::var(name).ok())
}

/// `OPENAI_BASE_URL` wins over `ai.base_url`; `--model` wins over `ai.model`.
pub fn resolve_session_with<F>(
    config: &Config,
    model_override: Option<&str>,
    env: F,
) -> Result<ProviderSession, ProviderResolutionError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let api_key = non_empty(env(API_KEY_ENV))
        .ok_or_else(ProviderResolutionError::missing_authentication)?;
    let base_url = non_empty(env(BASE_URL_ENV))
        .or_else(|| non_empty(config.ai.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
    let model = non_empty(model_override.map(str::to_string))
        .or_else(|| non_empty(config.ai.model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let provider_display_name = if base_url == DEFAULT_OPENAI_BASE_URL {
        "OpenAI".to_string()
    } else {
        "OpenAI-compatible".to_string()
    };

    Ok(ProviderSession {
        api_key,
        base_url,
        model,
        provider_display_name,
    })
}
