//! Configuration: a nested dotted-key accessor over a `serde_json::Value`
//! tree, loaded once from the file named on the CLI.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// The raw hierarchical configuration tree, plus a typed, defaulted
/// accessor over it (`server.port`, `server.log_level`, ...).
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Loads a configuration file from disk. Any failure to read or
    /// parse the file yields an empty tree, so every lookup falls back
    /// to its caller-supplied default rather than the process failing
    /// to start over a missing config file.
    pub fn load(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(root) => Self { root },
                Err(_) => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Walks `key` (dot-separated, e.g. `"server.port"`) through the
    /// config tree and deserializes the leaf value as `T`. Returns
    /// `default` if any segment is missing or the leaf does not
    /// deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let mut node = &self.root;
        for segment in key.split('.') {
            match node.get(segment) {
                Some(next) => node = next,
                None => return default,
            }
        }
        serde_json::from_value(node.clone()).unwrap_or(default)
    }
}

/// The subset of configuration the server facade and reactor consume,
/// resolved once at `Server::builder()` time from a [`Config`] tree
/// plus the ambient defaults documented in the crate's configuration
/// surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub thread_pool_size: usize,
    pub max_connections: usize,
    pub timeout_seconds: u64,
    pub keep_alive_timeout: u64,
    pub enable_keep_alive: bool,
    pub max_request_size: usize,
    pub max_header_size: usize,
    pub server_name: String,
    pub enable_logging: bool,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9006,
            thread_pool_size: 0,
            max_connections: 1024,
            timeout_seconds: 60,
            keep_alive_timeout: 5,
            enable_keep_alive: true,
            max_request_size: 1024 * 1024,
            max_header_size: 8192,
            server_name: "XKOJ/1.0".to_string(),
            enable_logging: true,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    /// Resolves a [`ServerConfig`] from the `server.*` keys of `config`,
    /// falling back to [`ServerConfig::default`] for anything missing.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            host: config.get("server.host", defaults.host),
            port: config.get("server.port", defaults.port),
            thread_pool_size: config.get("server.thread_pool_size", defaults.thread_pool_size),
            max_connections: config.get("server.max_connections", defaults.max_connections),
            timeout_seconds: config.get("server.timeout_seconds", defaults.timeout_seconds),
            keep_alive_timeout: config.get("server.keep_alive_timeout", defaults.keep_alive_timeout),
            enable_keep_alive: config.get("server.enable_keep_alive", defaults.enable_keep_alive),
            max_request_size: config.get("server.max_request_size", defaults.max_request_size),
            max_header_size: config.get("server.max_header_size", defaults.max_header_size),
            server_name: config.get("server.server_name", defaults.server_name),
            enable_logging: config.get("server.enable_logging", defaults.enable_logging),
            enable_cors: config.get("server.enable_cors", defaults.enable_cors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/path/server.json");
        assert_eq!(config.get("server.port", 9006u16), 9006);
    }

    #[test]
    fn dotted_key_walks_nested_objects() {
        let config = Config {
            root: serde_json::json!({
                "server": { "port": 8080, "host": "127.0.0.1" },
                "log_level": "debug",
            }),
        };
        assert_eq!(config.get("server.port", 0u16), 8080);
        assert_eq!(config.get("server.host", String::new()), "127.0.0.1");
        assert_eq!(config.get("log_level", String::new()), "debug");
    }

    #[test]
    fn missing_key_falls_back_to_default() {
        let config = Config {
            root: serde_json::json!({ "server": {} }),
        };
        assert_eq!(config.get("server.nonexistent", 42i64), 42);
        assert_eq!(config.get("nonexistent.deep.path", "fallback".to_string()), "fallback");
    }

    #[test]
    fn type_mismatch_falls_back_to_default() {
        let config = Config {
            root: serde_json::json!({ "server": { "port": "not-a-number" } }),
        };
        assert_eq!(config.get("server.port", 9006u16), 9006);
    }

    #[test]
    fn server_config_resolves_from_nested_keys() {
        let config = Config {
            root: serde_json::json!({
                "server": { "port": 8080, "server_name": "Demo/1.0", "enable_cors": true }
            }),
        };
        let resolved = ServerConfig::from_config(&config);
        assert_eq!(resolved.port, 8080);
        assert_eq!(resolved.server_name, "Demo/1.0");
        assert!(resolved.enable_cors);
        assert_eq!(resolved.host, ServerConfig::default().host);
    }
}
