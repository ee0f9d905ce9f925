use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::memory_guard::DEFAULT_TOTAL_BUFFER_BUDGET;
use crate::error::ConfigError;
use crate::protocol::frame::{DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_MAX_FRAME_LENGTH};

/// Host name announced in the handshake when none is configured.
pub const DEFAULT_SERVER_NAME: &str = "mock.firebase.server";

/// Settings consumed by the connection manager and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOptions {
    /// Host name sent in the handshake.
    pub name: String,
    /// Outbound chunk size in characters.
    pub max_frame_length: usize,
    /// Per-session cap on partial inbound frames.
    pub max_buffered_bytes: usize,
    /// Cap on partial inbound frames across all sessions.
    pub max_total_buffered_bytes: u64,
    /// Secret used to verify tokens and to grant admin access.
    pub auth_secret: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            max_total_buffered_bytes: DEFAULT_TOTAL_BUFFER_BUDGET,
            auth_secret: None,
        }
    }
}

impl ServerOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.auth_secret = secret;
        self
    }

    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }

    pub fn with_max_buffered_bytes(mut self, max: usize) -> Self {
        self.max_buffered_bytes = max;
        self
    }
}

/// Reads a JSON document from disk, such as bootstrap data or a rules file.
pub fn load_json_file(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: display,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let o = ServerOptions::default();
        assert_eq!(o.name, "mock.firebase.server");
        assert_eq!(o.max_frame_length, 16384);
        assert_eq!(o.max_buffered_bytes, 10 * 1024 * 1024);
        assert_eq!(o.auth_secret, None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let o: ServerOptions = serde_json::from_value(json!({"maxFrameLength": 10, "authSecret": "s"})).unwrap();
        assert_eq!(o.max_frame_length, 10);
        assert_eq!(o.auth_secret.as_deref(), Some("s"));
        assert_eq!(o.name, DEFAULT_SERVER_NAME);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rules": {{".read": true}}}}"#).unwrap();
        let v = load_json_file(file.path()).unwrap();
        assert_eq!(v, json!({"rules": {".read": true}}));
    }

    #[test]
    fn test_load_json_file_errors() {
        assert!(matches!(
            load_json_file("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(load_json_file(file.path()), Err(ConfigError::Json { .. })));
    }
}
