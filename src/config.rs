//! Configuration types.
//!
//! Everything is read from the environment once at startup and passed down
//! explicitly. Nothing below `main` looks at environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::email::EmailConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default model names per backend.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Which provider the operator asked for via `AI_PROVIDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    /// Anthropic first, then OpenAI.
    Auto,
    Anthropic,
    OpenAi,
    /// Skip inference entirely; every adapter uses its heuristics.
    FallbackOnly,
}

impl ProviderSelection {
    /// Parse the selector string. Unknown values are rejected.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "fallback" | "none" => Ok(Self::FallbackOnly),
            other => Err(ConfigError::InvalidValue {
                key: "AI_PROVIDER".into(),
                message: format!("unknown provider '{other}'"),
            }),
        }
    }

    /// Preferred backend order before filtering by configured keys.
    pub fn preference(&self) -> Vec<LlmBackend> {
        match self {
            Self::Auto | Self::Anthropic => vec![LlmBackend::Anthropic, LlmBackend::OpenAi],
            Self::OpenAi => vec![LlmBackend::OpenAi, LlmBackend::Anthropic],
            Self::FallbackOnly => Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::FallbackOnly => "fallback",
        }
    }
}

/// Credentials for each backend, if present.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub anthropic: Option<(SecretString, String)>,
    pub openai: Option<(SecretString, String)>,
}

/// Resolve the ordered provider chain: configured provider, then the other
/// configured provider. Backends without a key are dropped.
pub fn provider_chain(selection: ProviderSelection, keys: &ProviderKeys) -> Vec<LlmConfig> {
    selection
        .preference()
        .into_iter()
        .filter_map(|backend| {
            let entry = match backend {
                LlmBackend::Anthropic => keys.anthropic.as_ref(),
                LlmBackend::OpenAi => keys.openai.as_ref(),
            };
            entry.map(|(key, model)| LlmConfig {
                backend,
                api_key: key.clone(),
                model: model.clone(),
            })
        })
        .collect()
}

/// Per-call timeouts for external collaborators.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub inference: Duration,
    pub mail: Duration,
    pub notification: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            inference: Duration::from_secs(30),
            mail: Duration::from_secs(60),
            notification: Duration::from_secs(15),
        }
    }
}

/// Operator notification targets.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    /// Receives escalation summaries.
    pub human_agent_email: Option<String>,
    /// Receives purchase-ready alerts.
    pub sales_team_email: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub sms: Option<SmsConfig>,
}

/// HTTP SMS gateway settings.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub recipient: String,
    pub api_token: Option<SecretString>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub provider: ProviderSelection,
    pub keys: ProviderKeys,
    pub timeouts: Timeouts,
    pub email: Option<EmailConfig>,
    pub fetch_window: usize,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_env("TRAVEL_ASSIST_PORT", 8080u16)?;
        let db_path = env_opt("TRAVEL_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/travel-assist.db"));
        let log_dir = env_opt("TRAVEL_ASSIST_LOG_DIR").map(PathBuf::from);

        let provider = ProviderSelection::parse(&env_opt("AI_PROVIDER").unwrap_or_default())?;
        let keys = ProviderKeys {
            anthropic: env_opt("ANTHROPIC_API_KEY").map(|key| {
                (
                    SecretString::from(key),
                    env_opt("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.into()),
                )
            }),
            openai: env_opt("OPENAI_API_KEY").map(|key| {
                (
                    SecretString::from(key),
                    env_opt("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
                )
            }),
        };

        let timeouts = Timeouts {
            inference: Duration::from_secs(parse_env("AI_TIMEOUT_SECS", 30u64)?),
            mail: Duration::from_secs(parse_env("MAIL_TIMEOUT_SECS", 60u64)?),
            notification: Duration::from_secs(parse_env("NOTIFY_TIMEOUT_SECS", 15u64)?),
        };

        let sms = if env_opt("SMS_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            match (env_opt("SMS_GATEWAY_URL"), env_opt("SMS_RECIPIENT")) {
                (Some(gateway_url), Some(recipient)) => Some(SmsConfig {
                    gateway_url,
                    recipient,
                    api_token: env_opt("SMS_API_TOKEN").map(SecretString::from),
                }),
                _ => {
                    return Err(ConfigError::MissingEnvVar(
                        "SMS_GATEWAY_URL and SMS_RECIPIENT (SMS_ENABLED=true)".into(),
                    ));
                }
            }
        } else {
            None
        };

        Ok(Self {
            port,
            db_path,
            log_dir,
            provider,
            keys,
            timeouts,
            email: EmailConfig::from_env(),
            fetch_window: parse_env("EMAIL_FETCH_WINDOW", 10usize)?,
            notifications: NotificationConfig {
                human_agent_email: env_opt("HUMAN_AGENT_EMAIL"),
                sales_team_email: env_opt("SALES_TEAM_EMAIL"),
                slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
                sms,
            },
        })
    }

    /// Ordered LLM configs for the failover chain.
    pub fn provider_chain(&self) -> Vec<LlmConfig> {
        provider_chain(self.provider, &self.keys)
    }
}

/// Read a non-empty environment variable.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
