//! CLI configuration loading.
//!
//! Reads `dsl-starter.yaml` and resolves environment variables. The file
//! says how to launch the grammar server (Docker image, local jar, or an
//! explicit command) and tunes the client session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::mcp_client::client::DEFAULT_PROTOCOL_VERSION;
use crate::mcp_client::types::ClientInfo;
use crate::mcp_client::{ClientOptions, ServerConfig};

/// File name searched for in the working directory and its parents.
pub const CONFIG_FILE_NAME: &str = "dsl-starter.yaml";

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "DSL_STARTER_CONFIG";

pub const DEFAULT_IMAGE: &str = "sshailabh/antlr4-mcp-server:latest";

/// Jar location relative to the repository root.
const DEFAULT_JAR_RELATIVE: &str = "antlr4-mcp-server/target/antlr4-mcp-server-0.2.0.jar";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid server settings: {reason}")]
    InvalidServer { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// How the grammar server is launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// `docker run -i --rm <image>`
    #[default]
    Docker,
    /// `java -jar <jar_path>`
    Jar,
    /// An explicit argument vector.
    Command,
}

/// `server:` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub mode: ServerMode,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub jar_path: Option<String>,
    /// Root used to locate the default jar. Defaults to the working directory.
    #[serde(default)]
    pub repo_root: Option<String>,
    /// Used when `mode: command`.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// `client:` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Per-request deadline. Absent means wait as long as the server takes.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_stderr_grace_ms")]
    pub stderr_grace_ms: u64,
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}
fn default_client_name() -> String {
    "dsl-starter".to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_shutdown_timeout_secs() -> u64 {
    5
}
fn default_stderr_grace_ms() -> u64 {
    2000
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            call_timeout_secs: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            stderr_grace_ms: default_stderr_grace_ms(),
        }
    }
}

/// `logging:` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Write logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
    /// Emit JSON lines to the log file.
    #[serde(default)]
    pub json: bool,
}

/// Top-level configuration (mirrors `dsl-starter.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl ServerSettings {
    /// Build the exact command used to launch the server.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let argv: Vec<String> = match self.mode {
            ServerMode::Docker => {
                let image = self
                    .image
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_IMAGE);
                ["docker", "run", "-i", "--rm", image]
                    .into_iter()
                    .map(String::from)
                    .collect()
            }
            ServerMode::Jar => {
                let jar = match self.jar_path.as_deref().map(str::trim) {
                    Some(path) if !path.is_empty() => expand_tilde(path),
                    _ => self
                        .repo_root()
                        .join(DEFAULT_JAR_RELATIVE)
                        .to_string_lossy()
                        .into_owned(),
                };
                vec!["java".into(), "-jar".into(), jar]
            }
            ServerMode::Command => self.command.clone(),
        };

        let mut config =
            ServerConfig::from_argv(argv).map_err(|_| ConfigError::InvalidServer {
                reason: "`mode: command` requires a non-empty `command` list".into(),
            })?;
        config.env = self.env.clone();
        config.cwd = self.cwd.as_deref().map(expand_tilde);
        Ok(config)
    }

    fn repo_root(&self) -> PathBuf {
        match self.repo_root.as_deref() {
            Some(root) if !root.trim().is_empty() => PathBuf::from(expand_tilde(root)),
            _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl ClientSettings {
    pub fn to_options(&self) -> ClientOptions {
        ClientOptions {
            protocol_version: self.protocol_version.clone(),
            client_info: ClientInfo {
                name: self.client_name.clone(),
                version: self.client_version.clone(),
            },
            call_timeout: self.call_timeout_secs.map(Duration::from_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            stderr_grace: Duration::from_millis(self.stderr_grace_ms),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `DSL_STARTER_CONFIG`, then walks upward from `start` looking for
/// `dsl-starter.yaml`, then the per-user config directory. `None` means
/// built-in defaults apply.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points at a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    // 3. Per-user config
    let user = dirs::config_dir()?.join("dsl-starter").join("config.yaml");
    user.exists().then_some(user)
}

/// Load and parse a configuration file, interpolating `${VAR}` references.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

/// Parse configuration text. An empty document yields the defaults.
pub fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

/// Load from an explicit path, or discover one, or fall back to defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let cwd = std::env::current_dir().unwrap_or_default();
    match find_config_path(&cwd) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => Ok(AppConfig::default()),
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
