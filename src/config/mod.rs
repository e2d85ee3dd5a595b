//! Configuration loading and management.
//!
//! Loads bridge configuration from `./wabridge.toml` (or `$WABRIDGE_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::phone::DEFAULT_COUNTRY_CODE;
use crate::server::DEFAULT_PORT;
use crate::whatsapp::client::DEFAULT_BRIDGE_PORT;

/// Config file used when `$WABRIDGE_CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "wabridge.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level bridge configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings (`[server]`).
    pub server: ServerConfig,
    /// WhatsApp sidecar settings (`[whatsapp]`).
    pub whatsapp: WhatsAppConfig,
    /// Logging settings (`[logging]`).
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$WABRIDGE_CONFIG_PATH` or `./wabridge.toml`.
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        Self::load_with(&Self::config_path_with(env), env)
    }

    /// Load from an explicit file path, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from `path` using a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve config path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("WABRIDGE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Server.
        if let Some(v) = env("WABRIDGE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env("PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(var = "PORT", value = %v, "ignoring invalid env override"),
            }
        }

        // WhatsApp.
        if let Some(v) = env("WABRIDGE_BRIDGE_URL") {
            self.whatsapp.bridge_url = v;
        }
        if let Some(v) = env("WABRIDGE_DEFAULT_COUNTRY_CODE") {
            self.whatsapp.default_country_code = v;
        }

        // Logging.
        if let Some(v) = env("WABRIDGE_LOGS_DIR") {
            self.logging.logs_dir = v;
        }
    }

    /// Check values that would otherwise fail late.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable bridge URL or a country code that
    /// is not all digits.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.whatsapp.bridge_url)
            .with_context(|| format!("invalid bridge_url {:?}", self.whatsapp.bridge_url))?;

        let code = &self.whatsapp.default_country_code;
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("default_country_code must be digits only, got {code:?}");
        }
        Ok(())
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }
}

// ── Server config ───────────────────────────────────────────────

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Whether to attach a permissive CORS layer.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors: true,
        }
    }
}

// ── WhatsApp config ─────────────────────────────────────────────

/// WhatsApp sidecar settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Base URL of the sidecar HTTP API.
    pub bridge_url: String,
    /// Country code replacing a leading `0` in local numbers.
    pub default_country_code: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            bridge_url: format!("http://127.0.0.1:{DEFAULT_BRIDGE_PORT}"),
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs; empty means console only.
    pub logs_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            logs_dir: String::new(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
