//! Configuration loading and parsing.
//!
//! Values come from environment variables first, then from an optional JSON
//! file whose keys use the same names, then from built-in defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV_VAR: &str = "AUDIO_PLAYBACK_CONFIG";
/// File name probed next to the executable and under `config/`.
pub const DEFAULT_CONFIG_FILE: &str = "audio_playback_config.json";

const DEFAULT_ALLOWED_HOSTS: [&str; 3] = ["127.0.0.1:*", "localhost:*", "[::1]:*"];

/// Which transport carries MCP messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "streamable-http" => Ok(Transport::Http),
            other => Err(format!("unknown transport '{other}' (expected stdio or http)")),
        }
    }
}

/// HTTP transport settings.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// JSON-RPC endpoint path, always starting with `/`.
    pub path: String,
    /// Host header patterns accepted when rebinding protection is on.
    pub allowed_hosts: Vec<String>,
    /// Origin header values accepted; empty accepts any origin.
    pub allowed_origins: Vec<String>,
    /// Enable Host/Origin validation.
    pub dns_rebinding_protection: bool,
}

impl HttpConfig {
    /// `host:port` string suitable for `HttpServer::bind`.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Fully resolved server configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Canonical sandbox root.
    pub root_dir: PathBuf,
    /// Device identifier passed to the player.
    pub output_device: String,
    /// Extension appended to filenames without one.
    pub default_format: String,
    /// Player executable.
    pub player_path: String,
    pub transport: Transport,
    pub http: HttpConfig,
    /// Grace period between the terminate request and a forced kill.
    pub stop_grace: Duration,
    /// Directory depth bound for file listings.
    pub list_max_depth: usize,
}

/// Source of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Config file schema. Keys match the environment variable names.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(rename = "AUDIO_ROOT_DIR")]
    pub audio_root_dir: Option<String>,
    #[serde(rename = "AUDIO_OUTPUT_DEVICE")]
    pub audio_output_device: Option<String>,
    #[serde(rename = "DEFAULT_FORMAT")]
    pub default_format: Option<String>,
    #[serde(rename = "FFPLAY_PATH")]
    pub ffplay_path: Option<String>,
    #[serde(rename = "MCP_TRANSPORT")]
    pub mcp_transport: Option<String>,
    #[serde(rename = "MCP_HTTP_HOST")]
    pub mcp_http_host: Option<String>,
    #[serde(rename = "MCP_HTTP_PORT")]
    pub mcp_http_port: Option<u16>,
    #[serde(rename = "MCP_HTTP_PATH")]
    pub mcp_http_path: Option<String>,
    #[serde(rename = "MCP_ALLOWED_HOSTS")]
    pub mcp_allowed_hosts: Option<Vec<String>>,
    #[serde(rename = "MCP_ALLOWED_ORIGINS")]
    pub mcp_allowed_origins: Option<Vec<String>>,
    #[serde(rename = "MCP_DNS_REBINDING_PROTECTION")]
    pub mcp_dns_rebinding_protection: Option<bool>,
    #[serde(rename = "PLAYER_STOP_GRACE_MS")]
    pub player_stop_grace_ms: Option<u64>,
    #[serde(rename = "LIST_MAX_DEPTH")]
    pub list_max_depth: Option<usize>,
}

/// Environment values layered over the file: a non-empty env var wins.
struct EnvLayer<'a> {
    env: &'a dyn EnvSource,
}

impl EnvLayer<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        self.env
            .var(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, file: Option<String>) -> Option<String> {
        self.raw(key).or_else(|| {
            file.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }

    fn list(&self, key: &str, file: Option<Vec<String>>) -> Option<Vec<String>> {
        match self.raw(key) {
            Some(raw) => Some(split_list(&raw)),
            None => file.map(|items| {
                items
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        }
    }

    fn parsed<T: FromStr>(&self, key: &'static str, file: Option<T>, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(file.unwrap_or(default)),
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &'static str, file: Option<bool>, default: bool) -> Result<bool, ConfigError> {
        match self.raw(key) {
            None => Ok(file.unwrap_or(default)),
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                key,
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(&ProcessEnv, config_file, &default_config_candidates())
    }

    /// Load configuration from an explicit environment source.
    ///
    /// `config_file` (the CLI flag) wins over `AUDIO_PLAYBACK_CONFIG`; either
    /// must exist when given. `fallbacks` are probed only when neither is set
    /// and are skipped silently when absent.
    pub fn load_from(
        env: &dyn EnvSource,
        config_file: Option<&Path>,
        fallbacks: &[PathBuf],
    ) -> Result<Self, ConfigError> {
        let named = config_file
            .map(Path::to_path_buf)
            .or_else(|| env.var(CONFIG_ENV_VAR).filter(|v| !v.trim().is_empty()).map(PathBuf::from));
        let file = match named {
            Some(path) => read_config_file(&path)?,
            None => match fallbacks.iter().find(|p| p.is_file()) {
                Some(path) => read_config_file(path)?,
                None => FileConfig::default(),
            },
        };
        let env = EnvLayer { env };

        let root_raw = env
            .string("AUDIO_ROOT_DIR", file.audio_root_dir)
            .ok_or(ConfigError::Missing("AUDIO_ROOT_DIR"))?;
        let output_device = env
            .string("AUDIO_OUTPUT_DEVICE", file.audio_output_device)
            .ok_or(ConfigError::Missing("AUDIO_OUTPUT_DEVICE"))?;
        let default_format = env
            .string("DEFAULT_FORMAT", file.default_format)
            .map(|f| f.trim_start_matches('.').to_string())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "wav".to_string());
        let player_path = env
            .string("FFPLAY_PATH", file.ffplay_path)
            .unwrap_or_else(|| "ffplay".to_string());

        let root_dir = resolve_root(&root_raw)?;

        let transport = match env.string("MCP_TRANSPORT", file.mcp_transport) {
            None => Transport::Stdio,
            Some(raw) => raw.parse::<Transport>().map_err(|reason| ConfigError::Invalid {
                key: "MCP_TRANSPORT",
                value: raw.clone(),
                reason,
            })?,
        };

        let mut path = env
            .string("MCP_HTTP_PATH", file.mcp_http_path)
            .unwrap_or_else(|| "/mcp".to_string());
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        let dns_rebinding_protection = env.flag(
            "MCP_DNS_REBINDING_PROTECTION",
            file.mcp_dns_rebinding_protection,
            true,
        )?;
        let allowed_hosts = env
            .list("MCP_ALLOWED_HOSTS", file.mcp_allowed_hosts)
            .unwrap_or_else(|| DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect());
        if dns_rebinding_protection && allowed_hosts.is_empty() {
            return Err(ConfigError::Invalid {
                key: "MCP_ALLOWED_HOSTS",
                value: String::new(),
                reason: "at least one host is required while rebinding protection is on".to_string(),
            });
        }
        let http = HttpConfig {
            host: env
                .string("MCP_HTTP_HOST", file.mcp_http_host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env.parsed("MCP_HTTP_PORT", file.mcp_http_port, 8765u16)?,
            path,
            allowed_hosts,
            allowed_origins: env
                .list("MCP_ALLOWED_ORIGINS", file.mcp_allowed_origins)
                .unwrap_or_default(),
            dns_rebinding_protection,
        };
        let stop_grace_ms = env.parsed("PLAYER_STOP_GRACE_MS", file.player_stop_grace_ms, 500u64)?;

        Ok(Self {
            root_dir,
            output_device,
            default_format,
            player_path,
            transport,
            http,
            stop_grace: Duration::from_millis(stop_grace_ms),
            list_max_depth: env.parsed("LIST_MAX_DEPTH", file.list_max_depth, 8usize)?,
        })
    }
}

/// Config file locations probed when none is named explicitly.
pub fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(DEFAULT_CONFIG_FILE));
    }
    if let Ok(dir) = std::env::current_dir() {
        candidates.push(dir.join("config").join(DEFAULT_CONFIG_FILE));
    }
    candidates
}

fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

fn resolve_root(raw: &str) -> Result<PathBuf, ConfigError> {
    let expanded = expand_home(raw);
    let root = expanded
        .canonicalize()
        .map_err(|_| ConfigError::RootMissing(expanded.display().to_string()))?;
    if !root.is_dir() {
        return Err(ConfigError::RootNotDirectory(root.display().to_string()));
    }
    Ok(root)
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
