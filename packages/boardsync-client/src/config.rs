/// Configuration for a board client.
/// Reads client.json from ~/.config/boardsync/client.json (or platform equivalent).
use boardsync_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Socket.IO endpoint on the ticket store, engine.io v4 over WebSocket.
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Explicit push endpoint. Derived from `server_url` when absent.
    #[serde(default)]
    pub push_url: Option<String>,
    #[serde(default = "default_true")]
    pub push_enabled: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            push_url: None,
            push_enabled: true,
            request_timeout_secs: default_request_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// WebSocket URL to read pushes from, or `None` when pushes are off.
    pub fn resolved_push_url(&self) -> Option<String> {
        if !self.push_enabled {
            return None;
        }
        match &self.push_url {
            Some(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
            _ => Some(derive_push_url(&self.server_url)),
        }
    }
}

fn derive_push_url(server_url: &str) -> String {
    let base = server_url.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", base, SOCKET_IO_PATH)
}

/// Default config path: ~/.config/boardsync/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
        .join("client.json")
}

/// Load config from path. Returns default if the file doesn't exist or
/// can't be parsed.
pub fn load_config(path: &Path) -> ClientConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[boardsync.config] Failed to parse config {}: {}",
                path.display(),
                e
            );
            ClientConfig::default()
        }),
        Err(_) => {
            log::info!(
                "[boardsync.config] No config at {}, using defaults",
                path.display()
            );
            ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("client.json"));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config(&path), ClientConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.json");
        fs::write(
            &path,
            r#"{"server_url": "https://kanban.example.org/", "engine": {"per_page": 20}}"#,
        )
        .unwrap();
        let config = load_config(&path);
        assert_eq!(config.server_url, "https://kanban.example.org/");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.engine.per_page, 20);
        assert_eq!(config.engine.reorder_debounce_ms, 150);
    }

    #[test]
    fn test_push_url_derived_from_server_url() {
        let config = ClientConfig {
            server_url: "https://kanban.example.org/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.resolved_push_url().unwrap(),
            "wss://kanban.example.org/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            ClientConfig::default().resolved_push_url().unwrap(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_explicit_or_disabled_push_url() {
        let explicit = ClientConfig {
            push_url: Some("ws://push.local/events".to_string()),
            ..ClientConfig::default()
        };
        assert_eq!(explicit.resolved_push_url().unwrap(), "ws://push.local/events");

        let disabled = ClientConfig {
            push_enabled: false,
            ..explicit
        };
        assert!(disabled.resolved_push_url().is_none());
    }

    #[test]
    fn test_default_path_ends_with_client_json() {
        let path = default_config_path();
        assert!(path.ends_with("boardsync/client.json"));
    }
}
