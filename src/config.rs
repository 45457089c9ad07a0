//! Configuration loading and validation for the MCP bridge
//!
//! Unlike a CLI application configured from a single YAML/TOML file, the
//! bridge is deployment-driven: almost every tunable is read from the
//! environment (§6). The one exception is the child program description
//! ([`ToolSpec`]), which is deployment-specific and lives in a small JSON
//! file named by `MCP_CONFIG_PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;
const DEFAULT_MAX_SUBSCRIBERS: usize = 64;
const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
const DEFAULT_KEEPALIVE_SECS: u64 = 30;
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RESTART_BACKOFF_BASE_MS: u64 = 1000;
const DEFAULT_RESTART_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_CONFIG_PATH: &str = "mcp.json";

/// Immutable description of the child program, loaded from the JSON file at
/// `MCP_CONFIG_PATH` before `${input:ID}` resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Executable name or path.
    pub command: String,
    /// Ordered command-line arguments. May contain `${input:ID}` tokens.
    #[serde(default)]
    pub args: Vec<String>,
    /// Declared defaults for `${input:ID}` tokens, keyed by `ID`, used only
    /// when neither `INPUT_<ID>` nor the bare `<ID>` environment variable is
    /// set.
    #[serde(default)]
    pub input_defaults: HashMap<String, String>,
}

/// Fully resolved, read-only-after-startup bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The resolved child program description (args already substituted).
    pub tool: ToolSpec,
    /// Listen port for the HTTP server.
    pub port: u16,
    /// Per-subscriber queue byte ceiling; also caps the replay buffer.
    pub max_buffer_size: usize,
    /// Per-engine subscriber count ceiling.
    pub max_subscribers: usize,
    /// Ingress body byte ceiling.
    pub max_message_size: usize,
    /// Period between keepalive frames on the event-stream engine.
    pub keepalive_interval: Duration,
    /// Advisory subscriber idle cutoff.
    pub stream_timeout: Duration,
    /// Base delay for the restart backoff (§4.1).
    pub restart_backoff_base: Duration,
    /// Ceiling for the restart backoff (§4.1).
    pub restart_backoff_max: Duration,
    /// If true, the child is not spawned until first need.
    pub lazy_start: bool,
}

impl BridgeConfig {
    /// Load configuration from environment variables and the `ToolSpec` file
    /// named by `MCP_CONFIG_PATH` (or `config_path_override` if given, e.g.
    /// from a `--config` CLI flag), then validate it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ConfigInvalid`] if the `ToolSpec` file cannot be
    /// read or parsed, if a `${input:ID}` token cannot be resolved, or if
    /// validation fails.
    pub fn load(config_path_override: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path_override
            .or_else(|| std::env::var("MCP_CONFIG_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let raw_tool = load_tool_spec(&config_path)?;
        let tool = resolve_inputs(raw_tool, &std::env::vars().collect())?;

        let config = Self {
            tool,
            port: env_parsed("PORT", DEFAULT_PORT)?,
            max_buffer_size: env_parsed("MAX_BUFFER_SIZE", DEFAULT_MAX_BUFFER_SIZE)?,
            max_subscribers: env_parsed("MAX_SUBSCRIBERS", DEFAULT_MAX_SUBSCRIBERS)?,
            max_message_size: env_parsed("MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE)?,
            keepalive_interval: Duration::from_secs(env_parsed(
                "KEEPALIVE_INTERVAL",
                DEFAULT_KEEPALIVE_SECS,
            )?),
            stream_timeout: Duration::from_secs(env_parsed(
                "STREAM_TIMEOUT",
                DEFAULT_STREAM_TIMEOUT_SECS,
            )?),
            restart_backoff_base: Duration::from_millis(env_parsed(
                "RESTART_BACKOFF_BASE",
                DEFAULT_RESTART_BACKOFF_BASE_MS,
            )?),
            restart_backoff_max: Duration::from_millis(env_parsed(
                "RESTART_BACKOFF_MAX",
                DEFAULT_RESTART_BACKOFF_MAX_MS,
            )?),
            lazy_start: env_bool("LAZY_START", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can never produce a working bridge.
    pub fn validate(&self) -> Result<()> {
        if self.tool.command.trim().is_empty() {
            return Err(BridgeError::ConfigInvalid(
                "tool.command must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(BridgeError::ConfigInvalid(
                "port must be nonzero".to_string(),
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(BridgeError::ConfigInvalid(
                "maxBufferSize must be at least 1".to_string(),
            ));
        }
        if self.max_subscribers == 0 {
            return Err(BridgeError::ConfigInvalid(
                "maxSubscribers must be at least 1".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(BridgeError::ConfigInvalid(
                "maxMessageSize must be at least 1".to_string(),
            ));
        }
        if self.restart_backoff_base > self.restart_backoff_max {
            return Err(BridgeError::ConfigInvalid(
                "restartBackoffBase must not exceed restartBackoffMax".to_string(),
            ));
        }
        Ok(())
    }
}

fn load_tool_spec(path: &Path) -> Result<ToolSpec> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::ConfigInvalid(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| BridgeError::ConfigInvalid(format!("failed to parse {}: {e}", path.display())))
}

/// Resolve every `${input:ID}` token in `spec.args` against, in order: an
/// `INPUT_<ID>` environment variable, the bare `<ID>` environment variable,
/// then `spec.input_defaults["ID"]`. Unresolvable tokens are a fatal
/// configuration error.
fn resolve_inputs(mut spec: ToolSpec, env: &HashMap<String, String>) -> Result<ToolSpec> {
    for arg in &mut spec.args {
        *arg = resolve_input_token(arg, env, &spec.input_defaults)?;
    }
    Ok(spec)
}

fn resolve_input_token(
    arg: &str,
    env: &HashMap<String, String>,
    defaults: &HashMap<String, String>,
) -> Result<String> {
    let Some(id) = extract_input_id(arg) else {
        return Ok(arg.to_string());
    };

    let resolved = env
        .get(&format!("INPUT_{id}"))
        .or_else(|| env.get(id))
        .or_else(|| defaults.get(id))
        .ok_or_else(|| {
            BridgeError::ConfigInvalid(format!(
                "could not resolve ${{input:{id}}}: set INPUT_{id}, {id}, or declare a default"
            ))
        })?;

    Ok(arg.replace(&format!("${{input:{id}}}"), resolved))
}

fn extract_input_id(arg: &str) -> Option<&str> {
    let start = arg.find("${input:")? + "${input:".len();
    let end = arg[start..].find('}')? + start;
    Some(&arg[start..end])
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| BridgeError::ConfigInvalid(format!("invalid value for {key}: {v}"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(BridgeError::ConfigInvalid(format!(
                "invalid boolean value for {key}: {v}"
            ))),
        },
        Err(_) => Ok(default),
    }
}
