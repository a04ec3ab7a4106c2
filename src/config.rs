//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf, time::Duration};

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationConfig,
    pub admin: AdminConfig,
    /// Local accounts created or refreshed at startup
    #[serde(default)]
    pub users: Vec<LocalUserConfig>,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// PKCS#8 PEM private key, inline. Literal `\n` sequences are accepted.
    pub private_key_pem: Option<String>,
    /// Path to a PKCS#8 PEM file, used when no inline key is set
    pub private_key_path: Option<PathBuf>,
    /// User-Agent header for every outbound request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound for each outbound request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Accepted distance between a signed Date header and now (0 disables)
    #[serde(default = "default_signature_max_skew_secs")]
    pub signature_max_skew_secs: u64,
    /// Allow fetching actors on loopback and private networks
    #[serde(default)]
    pub allow_private_addresses: bool,
}

impl FederationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn signature_max_skew(&self) -> Option<Duration> {
        (self.signature_max_skew_secs > 0).then(|| Duration::from_secs(self.signature_max_skew_secs))
    }

    /// Read the configured private key PEM
    ///
    /// # Errors
    /// Returns `AppError::Config` when neither source is set or the file
    /// cannot be read
    pub fn private_key_source(&self) -> Result<String, AppError> {
        if let Some(pem) = self.private_key_pem.as_deref().filter(|pem| !pem.trim().is_empty()) {
            return Ok(pem.to_string());
        }

        match &self.private_key_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!(
                    "failed to read federation.private_key_path {}: {e}",
                    path.display()
                ))
            }),
            None => Err(AppError::Config(
                "federation.private_key_pem or federation.private_key_path is required"
                    .to_string(),
            )),
        }
    }
}

fn default_user_agent() -> String {
    format!("followbox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_signature_max_skew_secs() -> u64 {
    300
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bearer token accepted by /api routes
    pub api_token: String,
}

/// A local account published as an actor
#[derive(Debug, Clone, Deserialize)]
pub struct LocalUserConfig {
    /// Stable id used in every actor IRI
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub icon_media_type: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FOLLOWBOX__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/followbox.db")?
            .set_default("federation.request_timeout_secs", 30)?
            .set_default("federation.signature_max_skew_secs", 300)?
            .set_default("federation.allow_private_addresses", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FOLLOWBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        const MIN_API_TOKEN_BYTES: usize = 16;

        if self.admin.api_token.len() < MIN_API_TOKEN_BYTES {
            return Err(AppError::Config(format!(
                "admin.api_token must be at least {} bytes",
                MIN_API_TOKEN_BYTES
            )));
        }

        if self.federation.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "federation.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.federation.private_key_pem.is_none() && self.federation.private_key_path.is_none()
        {
            return Err(AppError::Config(
                "federation.private_key_pem or federation.private_key_path is required"
                    .to_string(),
            ));
        }

        for user in &self.users {
            if user.id.trim().is_empty() || user.username.trim().is_empty() {
                return Err(AppError::Config(
                    "users entries need a non-empty id and username".to_string(),
                ));
            }
        }

        if !self.server.protocol.eq_ignore_ascii_case("https") {
            if is_local_server_domain(&self.server.domain) {
                let host = normalized_server_host(&self.server.domain);
                tracing::warn!(host = %host, "Serving actors over plain http for local development");
            } else {
                return Err(AppError::Config(
                    "server.protocol must be https for non-local server domains".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
