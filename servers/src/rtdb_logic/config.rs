use clap::Parser;
use lib_rtdb::configs::{load_json_file, ServerOptions};
use lib_rtdb::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Config file read when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rtdb_server.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Realtime database protocol server", version)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[clap(long, env = "RTDB_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "RTDB_ADDRESS", help = "Address to bind to.")]
    pub address: Option<IpAddr>,

    #[clap(long, env = "RTDB_NAME", help = "Host name announced in the handshake.")]
    pub name: Option<String>,

    #[clap(long, env = "RTDB_DATA", value_parser = parse_json_arg, help = "Inline JSON used as the initial data tree.")]
    pub data: Option<Value>,

    #[clap(long, env = "RTDB_FILE", help = "JSON file used as the initial data tree. Takes precedence over --data.")]
    pub file: Option<PathBuf>,

    #[clap(long, env = "RTDB_RULES", help = "JSON rules file.")]
    pub rules: Option<PathBuf>,

    #[clap(long, env = "RTDB_SECRET", help = "Secret for token signatures and admin access.")]
    pub secret: Option<String>,

    #[clap(long, env = "RTDB_REST", num_args = 0..=1, default_missing_value = "true", help = "Serve the REST adapter on <path>.json.")]
    pub rest: Option<bool>,

    #[clap(long, env = "RTDB_MAX_FRAME_LENGTH", help = "Maximum outbound frame length in characters.")]
    pub max_frame_length: Option<usize>,

    #[clap(long, env = "RTDB_MAX_BUFFERED_BYTES", help = "Per-connection cap on partially received frames.")]
    pub max_buffered_bytes: Option<usize>,

    #[clap(long, env = "RTDB_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RTDB_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RTDB_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

fn parse_json_arg(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

impl ServerConfig {
    // Merge two configs, where 'other' overrides 'self' for Some values
    fn merge(self, other: ServerConfig) -> ServerConfig {
        ServerConfig {
            port: other.port.or(self.port),
            address: other.address.or(self.address),
            name: other.name.or(self.name),
            data: other.data.or(self.data),
            file: other.file.or(self.file),
            rules: other.rules.or(self.rules),
            secret: other.secret.or(self.secret),
            rest: other.rest.or(self.rest),
            max_frame_length: other.max_frame_length.or(self.max_frame_length),
            max_buffered_bytes: other.max_buffered_bytes.or(self.max_buffered_bytes),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    fn defaults() -> ServerConfig {
        let options = ServerOptions::default();
        ServerConfig {
            port: Some(5000),
            address: Some(IpAddr::from([0, 0, 0, 0])),
            name: Some("localhost.firebaseio.test".to_string()),
            data: Some(Value::Object(Default::default())),
            rest: Some(false),
            max_frame_length: Some(options.max_frame_length),
            max_buffered_bytes: Some(options.max_buffered_bytes),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.address.unwrap_or(IpAddr::from([0, 0, 0, 0])),
            self.port.unwrap_or(5000),
        )
    }

    pub fn rest_enabled(&self) -> bool {
        self.rest.unwrap_or(false)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// The library-side settings for sessions.
    pub fn server_options(&self) -> ServerOptions {
        let mut options = ServerOptions::default().with_secret(self.secret.clone());
        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        if let Some(max) = self.max_frame_length {
            options = options.with_max_frame_length(max);
        }
        if let Some(max) = self.max_buffered_bytes {
            options = options.with_max_buffered_bytes(max);
        }
        options
    }

    /// The initial data tree: `file` if set, else `data`, else empty.
    pub fn bootstrap_data(&self) -> Result<Value, ConfigError> {
        match (&self.file, &self.data) {
            (Some(file), _) => load_json_file(file),
            (None, Some(data)) => Ok(data.clone()),
            (None, None) => Ok(Value::Object(Default::default())),
        }
    }

    /// The rules document, if a rules file is configured.
    pub fn rules_document(&self) -> Result<Option<Value>, ConfigError> {
        self.rules.as_ref().map(load_json_file).transpose()
    }
}

/// Builds the effective configuration: defaults, then the config file,
/// then environment variables and CLI arguments.
pub fn load_config() -> ServerConfig {
    load_config_from(ServerConfig::parse())
}

/// Like [`load_config`] with already-parsed environment/CLI values.
pub fn load_config_from(cli: ServerConfig) -> ServerConfig {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = ServerConfig::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<ServerConfig> {
    if !path.exists() {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return None;
    }
    let Ok(config_str) = fs::read_to_string(path) else {
        log::warn!("Failed to read config file: {}. Falling back to other sources.", path.display());
        return None;
    };
    match serde_json::from_str::<ServerConfig>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!(
                "Failed to parse config file: {} ({e}). Falling back to other sources.",
                path.display()
            );
            None
        }
    }
}
