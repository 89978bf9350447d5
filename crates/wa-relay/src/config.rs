//! Service configuration.
//!
//! Layered the usual way: built-in defaults, then an optional TOML file, then
//! `WA_RELAY__SECTION__KEY` environment variables. Secrets may be written as
//! `env:VAR_NAME` and are resolved at startup.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wa_session::{BridgeConfig, DEFAULT_ADDRESS_SUFFIX, LifecycleConfig};

pub const APP_NAME: &str = "wa-relay";

/// Placeholder printed instead of secrets.
const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub pairing: PairingConfig,
    pub bridge: BridgeSettings,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared bearer token. REQUIRED. Supports `env:VAR_NAME`.
    pub api_token: Option<String>,
}

impl AuthConfig {
    /// Resolve the API token, expanding `env:VAR_NAME` syntax.
    pub fn resolve_api_token(&self) -> Result<Option<String>, ConfigValidationError> {
        self.api_token.as_deref().map(resolve_secret).transpose()
    }
}

/// Pairing handshake configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// How long an issued pairing code stays valid.
    pub ttl_secs: u64,
    /// How long a pairing request waits for a code.
    pub handshake_timeout_secs: u64,
    /// Suffix appended to bare recipient numbers.
    pub address_suffix: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 90,
            handshake_timeout_secs: 30,
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
        }
    }
}

impl PairingConfig {
    pub fn to_lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            pairing_ttl: Duration::from_secs(self.ttl_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            address_suffix: self.address_suffix.clone(),
        }
    }
}

/// Messaging bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub base_url: String,
    /// Optional bearer key for the bridge. Supports `env:VAR_NAME`.
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let defaults = BridgeConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key: None,
            request_timeout_secs: defaults.request_timeout.as_secs(),
            reconnect_delay_secs: defaults.reconnect_delay.as_secs(),
        }
    }
}

impl BridgeSettings {
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigValidationError> {
        Ok(BridgeConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.as_deref().map(resolve_secret).transpose()?,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error(
        "API token is required. Set WA_RELAY__AUTH__API_TOKEN or auth.api_token in the config file"
    )]
    MissingApiToken,

    #[error("environment variable {0} is not set")]
    EnvVarNotFound(String),

    #[error("environment variable {0} is empty")]
    EnvVarEmpty(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

impl AppConfig {
    /// Check the configuration is usable for serving.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        match self.auth.resolve_api_token()? {
            Some(token) if !token.is_empty() => {}
            _ => return Err(ConfigValidationError::MissingApiToken),
        }
        self.bridge.to_bridge_config()?;

        let durations = [
            ("pairing.ttl_secs", self.pairing.ttl_secs),
            (
                "pairing.handshake_timeout_secs",
                self.pairing.handshake_timeout_secs,
            ),
            ("bridge.request_timeout_secs", self.bridge.request_timeout_secs),
            ("bridge.reconnect_delay_secs", self.bridge.reconnect_delay_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigValidationError::ZeroValue(*name));
        }
        Ok(())
    }

    /// Copy with secrets replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.auth.api_token.is_some() {
            config.auth.api_token = Some(REDACTED.to_string());
        }
        if config.bridge.api_key.is_some() {
            config.bridge.api_key = Some(REDACTED.to_string());
        }
        config
    }
}

fn resolve_secret(value: &str) -> Result<String, ConfigValidationError> {
    match value.strip_prefix("env:") {
        Some(var_name) => match env::var(var_name) {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
            Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
        },
        None => Ok(value.to_string()),
    }
}

/// Load configuration from `path` (if it exists) and the environment.
pub fn load(path: &Path) -> Result<AppConfig> {
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(env_prefix().as_str())
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("reading configuration from {}", path.display()))?;

    built
        .try_deserialize()
        .context("parsing configuration")
}

/// Default config file location: `$XDG_CONFIG_HOME/wa-relay/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME).join("config.toml"));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME).join("config.toml"));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME).join("config.toml"))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    match path.to_str() {
        Some(text) => {
            let expanded = shellexpand::full(text).context("expanding path")?;
            Ok(PathBuf::from(expanded.to_string()))
        }
        None => Ok(path.to_path_buf()),
    }
}

fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_token(token: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.api_token = Some(token.to_string());
        config
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix(), "WA_RELAY");
    }

    #[test]
    fn test_defaults_match_observed_behavior() {
        let config = AppConfig::default();
        let lifecycle = config.pairing.to_lifecycle_config();
        assert_eq!(lifecycle.pairing_ttl, Duration::from_secs(90));
        assert_eq!(lifecycle.handshake_timeout, Duration::from_secs(30));
        assert_eq!(lifecycle.address_suffix, "@c.us");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_validate_requires_token() {
        assert_eq!(
            AppConfig::default().validate(),
            Err(ConfigValidationError::MissingApiToken)
        );
        assert_eq!(
            with_token("").validate(),
            Err(ConfigValidationError::MissingApiToken)
        );
        assert!(with_token("secret").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let mut config = with_token("secret");
        config.pairing.handshake_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroValue(
                "pairing.handshake_timeout_secs"
            ))
        );
    }

    #[test]
    fn test_validate_rejects_zero_reconnect_delay() {
        let mut config = with_token("secret");
        config.bridge.reconnect_delay_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroValue("bridge.reconnect_delay_secs"))
        );
    }

    #[test]
    fn test_env_secret_resolution() {
        let config = with_token("env:WA_RELAY_TEST_TOKEN_THAT_DOES_NOT_EXIST");
        assert_eq!(
            config.auth.resolve_api_token(),
            Err(ConfigValidationError::EnvVarNotFound(
                "WA_RELAY_TEST_TOKEN_THAT_DOES_NOT_EXIST".to_string()
            ))
        );

        let path = env::var("PATH").unwrap();
        let config = with_token("env:PATH");
        assert_eq!(config.auth.resolve_api_token(), Ok(Some(path)));

        let config = with_token("literal");
        assert_eq!(
            config.auth.resolve_api_token(),
            Ok(Some("literal".to_string()))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8081

[auth]
api_token = "file-token"

[pairing]
ttl_secs = 60

[bridge]
base_url = "http://bridge:9000"
"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.auth.api_token.as_deref(), Some("file-token"));
        assert_eq!(config.pairing.ttl_secs, 60);
        assert_eq!(config.pairing.handshake_timeout_secs, 30);
        assert_eq!(config.bridge.base_url, "http://bridge:9000");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = with_token("secret");
        config.bridge.api_key = Some("bridge-key".to_string());

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(!shown.contains("bridge-key"));
        assert!(shown.contains(REDACTED));
    }
}
