use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration of the webhook bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Session store name; the store lives at `<database_name>.db`.
    pub database_name: String,
    /// Directory reply images are read from.
    pub image_dir: String,
    /// Directory pairing QR codes are written to.
    pub qr_dir: String,
    /// Phone number owning the session.
    pub phone: String,
    /// Device JID of a previously paired session, used to resume it.
    pub device_jid: Option<String>,
    /// Endpoint inbound messages are forwarded to.
    pub webhook_url: String,
    pub webhook_enabled: bool,
    /// Answer every message with its own text instead of calling the webhook.
    pub echo_message: bool,
    /// Also print pairing codes to the terminal.
    pub print_qr_terminal: bool,
    /// Refuse to reply to numbers missing from the contact list.
    pub require_contact: bool,
    /// Overall webhook request timeout; zero disables it.
    pub http_timeout_secs: u64,
    pub log_level: String,
    /// `text` or `json`.
    pub log_format: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            database_name: "./data/whatsmeow".into(),
            image_dir: "./data/images".into(),
            qr_dir: "./data/qrcode".into(),
            phone: String::new(),
            device_jid: None,
            webhook_url: String::new(),
            webhook_enabled: true,
            echo_message: false,
            print_qr_terminal: true,
            require_contact: false,
            http_timeout_secs: 30,
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl BridgeConfig {
    /// Load a JSON config file. Missing keys take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the values a running bridge cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phone.trim().is_empty() {
            return Err(ConfigError::Invalid("phone is required".into()));
        }
        if self.database_name.trim().is_empty() {
            return Err(ConfigError::Invalid("database_name is required".into()));
        }
        Ok(())
    }

    /// Override the reply image directory.
    pub fn with_image_dir(mut self, dir: impl Into<String>) -> Self {
        self.image_dir = dir.into();
        self
    }

    /// Override the owner phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    /// Override the webhook endpoint.
    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = url.into();
        self
    }

    pub fn with_webhook_enabled(mut self, enabled: bool) -> Self {
        self.webhook_enabled = enabled;
        self
    }

    pub fn with_echo_message(mut self, echo: bool) -> Self {
        self.echo_message = echo;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_phone() {
        let config = BridgeConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(config.with_phone("+6281234").validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(
            &path,
            r#"{"phone": "+6281234", "webhook_url": "http://localhost/hook", "echo_message": true}"#,
        )
        .unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.phone, "+6281234");
        assert!(config.echo_message);
        assert_eq!(config.image_dir, BridgeConfig::default().image_dir);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            BridgeConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            BridgeConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
