//! Server configuration and LLM settings.
//!
//! Server options are layered with the `config` crate, lowest priority
//! first: built-in defaults, an optional YAML/TOML file, `GATEWAY_`-prefixed
//! environment variables (`GATEWAY_SERVER__PORT=9000`), then CLI flags.
//!
//! LLM settings come straight from the environment and are kept apart so the
//! API key never passes through the layered config.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::gateway::{DEFAULT_HISTORY_LIMIT, HistoryPolicy};
use crate::llm::{
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, LlmSettings, Provider,
    provider::DEFAULT_AZURE_API_VERSION,
};
use crate::session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TIMEOUT, StoreLimits, TrimMode};

/// Base URL used when `LLM_BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Environment variables checked for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["OPENAI_API_KEY", "LLM_API_KEY"];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    /// Messages kept per session after each exchange.
    pub history_limit: usize,
    pub trim_mode: TrimMode,
    pub max_sessions: usize,
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    /// Per-request timeout for completion calls; none by default.
    pub timeout_secs: Option<u64>,
}

impl SessionsConfig {
    #[must_use]
    pub fn history_policy(&self) -> HistoryPolicy {
        HistoryPolicy {
            limit: self.history_limit,
            mode: self.trim_mode,
        }
    }

    #[must_use]
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_sessions: self.max_sessions,
            idle_ttl: Duration::from_secs(self.idle_ttl_secs),
        }
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("sessions.history_limit", DEFAULT_HISTORY_LIMIT as u64)?
            .set_default("sessions.trim_mode", "pairwise")?
            .set_default("sessions.max_sessions", DEFAULT_MAX_SESSIONS as u64)?
            .set_default("sessions.idle_ttl_secs", DEFAULT_SESSION_TIMEOUT.as_secs())?
            .set_default("sessions.sweep_interval_secs", 60)?;

        // 2. Config file: explicit path must exist, ./config.{yaml,toml,...} is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. GATEWAY_SESSIONS__HISTORY_LIMIT=20
        builder = builder.add_source(
            Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and the PORT env fallback)
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.history_limit < 2 {
            return Err(ConfigError::Message(
                "sessions.history_limit must be at least 2".to_string(),
            ));
        }
        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::Message(
                "sessions.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.sessions.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "sessions.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load LLM settings from the process environment.
pub fn load_llm_settings() -> Result<LlmSettings, String> {
    llm_settings_from(|key| std::env::var(key).ok())
}

/// Build LLM settings from an arbitrary variable lookup.
///
/// Fails when no API key is configured: the gateway cannot serve anything
/// without one.
pub fn llm_settings_from<F>(lookup: F) -> Result<LlmSettings, String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

    let api_key = API_KEY_VARS
        .iter()
        .find_map(|key| non_empty(*key))
        .ok_or_else(|| format!("Missing required env var: {}", API_KEY_VARS.join(" or ")))?;

    let base_url = non_empty("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url::Url::parse(&base_url).map_err(|e| format!("LLM_BASE_URL is not a valid URL: {e}"))?;

    let model = non_empty("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

    // Auto-detect provider from base URL
    let mut provider = Provider::detect_from_url(&base_url);

    if let Provider::AzureOpenAI { .. } = &provider {
        let deployment_name = non_empty("AZURE_DEPLOYMENT_NAME").ok_or_else(|| {
            "AZURE_DEPLOYMENT_NAME is required for Azure OpenAI endpoints".to_string()
        })?;
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version: non_empty("AZURE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };
    }

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        temperature: DEFAULT_TEMPERATURE,
        max_tokens: DEFAULT_MAX_TOKENS,
        timeout: None,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = llm_settings_from(lookup(&[])).unwrap_err();
        assert!(err.contains("OPENAI_API_KEY"));

        let err = llm_settings_from(lookup(&[("OPENAI_API_KEY", "   ")])).unwrap_err();
        assert!(err.contains("Missing required env var"));
    }

    #[test]
    fn test_defaults_target_openai() {
        let settings = llm_settings_from(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.provider, Provider::OpenAI);
        assert!((settings.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.max_tokens, 500);
    }

    #[test]
    fn test_llm_api_key_alias() {
        let settings = llm_settings_from(lookup(&[
            ("LLM_API_KEY", "alias"),
            ("LLM_BASE_URL", "http://localhost:11434"),
            ("LLM_MODEL", "llama3"),
        ]))
        .unwrap();

        assert_eq!(settings.api_key, "alias");
        assert_eq!(settings.provider, Provider::Generic);
        assert_eq!(settings.model, "llama3");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = llm_settings_from(lookup(&[
            ("OPENAI_API_KEY", "k"),
            ("LLM_BASE_URL", "not a url"),
        ]))
        .unwrap_err();
        assert!(err.contains("LLM_BASE_URL"));
    }

    #[test]
    fn test_azure_requires_deployment() {
        let vars = [
            ("OPENAI_API_KEY", "k"),
            ("LLM_BASE_URL", "https://res.openai.azure.com"),
        ];
        assert!(llm_settings_from(lookup(&vars)).is_err());

        let settings = llm_settings_from(lookup(&[
            vars[0],
            vars[1],
            ("AZURE_DEPLOYMENT_NAME", "chat"),
        ]))
        .unwrap();
        assert_eq!(
            settings.provider,
            Provider::AzureOpenAI {
                deployment_name: "chat".to_string(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        );
    }
}
