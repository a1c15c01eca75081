use std::path::PathBuf;
use std::time::Duration;

use parley_crypto::policy::EncryptionPolicy;
use serde::Deserialize;

use crate::error::ClientError;

/// Client configuration loaded from `parley.toml` with env var overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Messaging API, without the `/api` suffix.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Directory holding the local store. Default: ".parley"
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Payload encryption used for direct messages. Default: "rsa-oaep"
    #[serde(default)]
    pub encryption: EncryptionPolicy,
    /// Seconds between polls of the open conversation. Default: 3
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// How far apart a cached outgoing message and its server copy may be stamped
    /// and still be treated as the same message. Default: 120
    #[serde(default = "default_self_echo_window_secs")]
    pub self_echo_window_secs: u64,
    /// HTTP request timeout. Default: 15
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Erase this device's private key on logout. Default: true
    #[serde(default = "default_clear_keys_on_logout")]
    pub clear_keys_on_logout: bool,
    /// Tracing log level. Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".parley")
}
fn default_poll_interval_secs() -> u64 {
    3
}
fn default_self_echo_window_secs() -> u64 {
    120
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_clear_keys_on_logout() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            data_dir: default_data_dir(),
            encryption: EncryptionPolicy::default(),
            poll_interval_secs: default_poll_interval_secs(),
            self_echo_window_secs: default_self_echo_window_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            clear_keys_on_logout: default_clear_keys_on_logout(),
            log_level: default_log_level(),
        }
    }
}

/// Upper bound for `self_echo_window_secs`: one day.
const MAX_SELF_ECHO_WINDOW_SECS: u64 = 86_400;

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, ClientError> {
    val.trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("invalid {name} value: {val}")))
}

impl ClientConfig {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Reads `parley.toml` from CWD (or the path in `PARLEY_CONFIG`). A missing
    /// file means defaults; a malformed one is an error.
    pub fn load() -> Result<Self, ClientError> {
        let path = std::env::var("PARLEY_CONFIG").unwrap_or_else(|_| "parley.toml".to_string());
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(ClientError::Config(format!("failed to read {path}: {e}"))),
        }
    }

    /// Load configuration from a TOML string, then apply env var overrides.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ClientError> {
        let mut config: ClientConfig =
            toml::from_str(toml_str).map_err(|e| ClientError::Config(e.to_string()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the config.
    ///
    /// Returns an error if an env var is set but has an invalid format
    /// (e.g., PARLEY_POLL_INTERVAL_SECS=abc).
    pub fn apply_env_overrides(&mut self) -> Result<(), ClientError> {
        if let Ok(val) = std::env::var("PARLEY_API_BASE_URL") {
            self.api_base_url = val;
        }
        if let Ok(val) = std::env::var("PARLEY_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("PARLEY_ENCRYPTION") {
            self.encryption = parse_env("PARLEY_ENCRYPTION", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_env("PARLEY_POLL_INTERVAL_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_SELF_ECHO_WINDOW_SECS") {
            self.self_echo_window_secs = parse_env("PARLEY_SELF_ECHO_WINDOW_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("PARLEY_REQUEST_TIMEOUT_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_CLEAR_KEYS_ON_LOGOUT") {
            self.clear_keys_on_logout = parse_env("PARLEY_CLEAR_KEYS_ON_LOGOUT", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_LOG_LEVEL") {
            self.log_level = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.poll_interval_secs == 0 {
            return Err(ClientError::Config(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.self_echo_window_secs > MAX_SELF_ECHO_WINDOW_SECS {
            return Err(ClientError::Config(format!(
                "self_echo_window_secs must be at most {MAX_SELF_ECHO_WINDOW_SECS}"
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ClientError::Config(format!(
                "api_base_url must be an http(s) URL: {}",
                self.api_base_url
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn self_echo_window(&self) -> chrono::Duration {
        let secs = self.self_echo_window_secs.min(MAX_SELF_ECHO_WINDOW_SECS) as i64;
        chrono::Duration::seconds(secs)
    }

    /// Path of the SQLite file backing the local store.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("parley.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_loads_from_valid_toml_string() {
        let toml = r#"
            api_base_url = "https://chat.example.com"
            data_dir = "/tmp/parley"
            encryption = "none"
            poll_interval_secs = 10
            self_echo_window_secs = 30
            request_timeout_secs = 20
            clear_keys_on_logout = false
            log_level = "debug"
        "#;
        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.api_base_url, "https://chat.example.com");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/parley"));
        assert_eq!(config.encryption, EncryptionPolicy::None);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.self_echo_window(), chrono::Duration::seconds(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert!(!config.clear_keys_on_logout);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/parley/parley.db"));
    }

    #[test]
    #[serial]
    fn config_has_correct_defaults_for_omitted_fields() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:5000");
        assert_eq!(config.encryption, EncryptionPolicy::RsaOaep);
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.self_echo_window_secs, 120);
        assert_eq!(config.request_timeout_secs, 15);
        assert!(config.clear_keys_on_logout);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    #[serial]
    fn config_applies_env_var_overrides() {
        std::env::set_var("PARLEY_API_BASE_URL", "http://override:9000");
        std::env::set_var("PARLEY_ENCRYPTION", "none");
        let config = ClientConfig::from_toml_str(r#"api_base_url = "http://original""#);
        std::env::remove_var("PARLEY_API_BASE_URL");
        std::env::remove_var("PARLEY_ENCRYPTION");

        let config = config.unwrap();
        assert_eq!(config.api_base_url, "http://override:9000");
        assert_eq!(config.encryption, EncryptionPolicy::None);
    }

    #[test]
    #[serial]
    fn config_rejects_invalid_env_value() {
        std::env::set_var("PARLEY_POLL_INTERVAL_SECS", "abc");
        let result = ClientConfig::from_toml_str("");
        std::env::remove_var("PARLEY_POLL_INTERVAL_SECS");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    #[serial]
    fn config_fails_on_malformed_toml() {
        let result = ClientConfig::from_toml_str("this is not valid = [[[toml");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    #[serial]
    fn config_rejects_zero_poll_interval() {
        let result = ClientConfig::from_toml_str("poll_interval_secs = 0");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    #[serial]
    fn config_rejects_oversized_self_echo_window() {
        let result = ClientConfig::from_toml_str("self_echo_window_secs = 9223372036854775807");
        assert!(matches!(result, Err(ClientError::Config(_))));

        std::env::set_var("PARLEY_SELF_ECHO_WINDOW_SECS", "86401");
        let result = ClientConfig::from_toml_str("");
        std::env::remove_var("PARLEY_SELF_ECHO_WINDOW_SECS");
        assert!(matches!(result, Err(ClientError::Config(_))));

        let config = ClientConfig::from_toml_str("self_echo_window_secs = 86400").unwrap();
        assert_eq!(config.self_echo_window(), chrono::Duration::days(1));

        let config = ClientConfig {
            self_echo_window_secs: u64::MAX,
            ..ClientConfig::default()
        };
        assert_eq!(config.self_echo_window(), chrono::Duration::days(1));
    }

    #[test]
    #[serial]
    fn config_rejects_non_http_base_url() {
        let result = ClientConfig::from_toml_str(r#"api_base_url = "ftp://nope""#);
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    #[serial]
    fn load_falls_back_to_defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("PARLEY_CONFIG", dir.path().join("absent.toml"));
        let config = ClientConfig::load();
        std::env::remove_var("PARLEY_CONFIG");
        assert_eq!(config.unwrap().poll_interval_secs, 3);
    }

    #[test]
    #[serial]
    fn load_reads_file_named_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "poll_interval_secs = 7\n").unwrap();
        std::env::set_var("PARLEY_CONFIG", &path);
        let config = ClientConfig::load();
        std::env::remove_var("PARLEY_CONFIG");
        assert_eq!(config.unwrap().poll_interval_secs, 7);
    }
}
