use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File, FileFormat};
use nexus::agent::{AgentConfig, DEFAULT_MAX_TURNS, DEFAULT_TOOL_TIMEOUT};
use nexus::finalizer::FinalizerStrategy;
use nexus::llm::configs::{ModelClientConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use nexus::orchestrator::{OrchestratorConfig, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_UPDATE_BUFFER};
use nexus::providers::base::ConnectionSpec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_PATH_VAR: &str = "NEXUS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "nexus.toml";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelSettings {
    pub endpoint: String,
    pub name: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    pub max_turns: usize,
    pub tool_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub update_buffer: usize,
    pub finalizer: FinalizerStrategy,
}

/// How to launch one compute provider, keyed by its alias in [`Settings::providers`]
#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `KEY=VALUE` entries. Kept as values because the config loader lowercases table keys.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ProviderSettings {
    // Expand `~` in the command and working directory
    pub fn to_connection_spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            command: shellexpand::tilde(&self.command).into_owned(),
            args: self.args.clone(),
            env: self
                .env
                .iter()
                .filter_map(|entry| parse_env_entry(entry))
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            cwd: self
                .cwd
                .as_deref()
                .map(|cwd| PathBuf::from(shellexpand::tilde(cwd).as_ref())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub agent: AgentSettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Model defaults
            .set_default("model.endpoint", DEFAULT_ENDPOINT)?
            .set_default("model.name", DEFAULT_MODEL)?
            .set_default("model.timeout_secs", DEFAULT_TIMEOUT.as_secs() as i64)?
            // Agent defaults
            .set_default("agent.max_turns", DEFAULT_MAX_TURNS as i64)?
            .set_default("agent.tool_timeout_secs", DEFAULT_TOOL_TIMEOUT.as_secs() as i64)?
            .set_default(
                "agent.discovery_timeout_secs",
                DEFAULT_DISCOVERY_TIMEOUT.as_secs() as i64,
            )?
            .set_default("agent.update_buffer", DEFAULT_UPDATE_BUFFER as i64)?
            .set_default("agent.finalizer", "last_assistant")?
            // Providers are usually declared in the config file
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("NEXUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => settings.validate(),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                if let Some(field) = missing_field_key(&err.to_string()) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::Other(config::ConfigError::Message(
                "agent.max_turns must be at least 1".to_string(),
            )));
        }
        for (alias, provider) in &self.providers {
            if let Some(entry) = provider.env.iter().find(|e| parse_env_entry(e).is_none()) {
                return Err(ConfigError::InvalidEnvEntry {
                    alias: alias.clone(),
                    entry: entry.clone(),
                });
            }
        }
        if self.agent.update_buffer == 0 {
            return Err(ConfigError::Other(config::ConfigError::Message(
                "agent.update_buffer must be at least 1".to_string(),
            )));
        }
        Ok(self)
    }

    pub fn model_config(&self) -> ModelClientConfig {
        let mut config = ModelClientConfig::new(&self.model.endpoint, &self.model.name)
            .with_timeout(Duration::from_secs(self.model.timeout_secs));
        if let Some(api_key) = &self.model.api_key {
            config = config.with_api_key(api_key);
        }
        config.temperature = self.model.temperature;
        config.max_tokens = self.model.max_tokens;
        config
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            agent: AgentConfig {
                max_turns: self.agent.max_turns,
                tool_timeout: Duration::from_secs(self.agent.tool_timeout_secs),
            },
            discovery_timeout: Duration::from_secs(self.agent.discovery_timeout_secs),
            finalizer: self.agent.finalizer,
            update_buffer: self.agent.update_buffer,
        }
    }

    pub fn connection_specs(&self) -> Vec<(String, ConnectionSpec)> {
        self.providers
            .iter()
            .map(|(alias, provider)| (alias.clone(), provider.to_connection_spec()))
            .collect()
    }
}

fn parse_env_entry(entry: &str) -> Option<(&str, &str)> {
    entry
        .split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| (name.trim(), value))
}

// Extract the dotted key from "missing field `command` for key `providers.fs`"
fn missing_field_key(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    match rest
        .split_once("for key `")
        .and_then(|(_, key)| key.split_once('`'))
    {
        Some((key, _)) if !key.is_empty() => Some(format!("{}.{}", key, field)),
        _ => Some(field.to_string()),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}
