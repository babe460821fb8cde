//! Configuration
//!
//! A [`Config`] is one optional layer (file, command line); layers are merged
//! with [`Config::overlay`] and validated once into an immutable
//! [`RuntimeConfig`].

use crate::auth::{AuthMode, Credentials};
use crate::odata::transport::{self, DispatchClient};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "oget.toml";

const DEFAULT_USER: &str = "odata";
const DEFAULT_PASSWORD: &str = "odata";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No service URL provided")]
    MissingServiceUrl,

    #[error("Invalid service URL '{url}': {reason}")]
    InvalidServiceUrl { url: String, reason: String },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Failed to set up TLS: {0}")]
    Tls(#[source] rustls::Error),
}

/// One configuration layer; unset fields fall through to lower layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Service root, e.g. `http://host:1337/default.ixsp/odata.svc`
    pub service_url: Option<String>,
    pub auth: Option<AuthMode>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Value for `$format` appended to every request
    pub format: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub insecure_ssl: Option<bool>,
}

impl Config {
    /// Load a layer from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `oget.toml` from the working directory, or an empty layer if absent
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.is_file() {
            tracing::debug!("Loading config from {}", path.display());
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge `upper` over `self`; fields set in `upper` win
    pub fn overlay(self, upper: Config) -> Config {
        Config {
            service_url: upper.service_url.or(self.service_url),
            auth: upper.auth.or(self.auth),
            user: upper.user.or(self.user),
            password: upper.password.or(self.password),
            format: upper.format.or(self.format),
            timeout_secs: upper.timeout_secs.or(self.timeout_secs),
            max_retries: upper.max_retries.or(self.max_retries),
            retry_delay_ms: upper.retry_delay_ms.or(self.retry_delay_ms),
            insecure_ssl: upper.insecure_ssl.or(self.insecure_ssl),
        }
    }

    /// Validate and fill defaults
    pub fn to_runtime(&self) -> Result<RuntimeConfig, ConfigError> {
        let raw = self
            .service_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingServiceUrl)?;

        let service_root = raw.trim_end_matches('/').to_string();
        let invalid = |reason: String| ConfigError::InvalidServiceUrl {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(&service_root).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must not carry a query or fragment".to_string()));
        }

        Ok(RuntimeConfig {
            origin: url.origin().ascii_serialization(),
            service_root,
            auth_mode: self.auth.unwrap_or_default(),
            credentials: Credentials::new(
                self.user.as_deref().unwrap_or(DEFAULT_USER),
                self.password.as_deref().unwrap_or(DEFAULT_PASSWORD),
            ),
            format: self.format.clone().filter(|f| !f.is_empty()),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(0),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            insecure_ssl: self.insecure_ssl.unwrap_or(false),
        })
    }
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Service root without trailing slash
    pub service_root: String,
    /// `scheme://authority` of the service root
    pub origin: String,
    pub auth_mode: AuthMode,
    pub credentials: Credentials,
    pub format: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub insecure_ssl: bool,
}

impl RuntimeConfig {
    /// Build the HTTP client used for login and logout
    pub fn http_client(&self) -> Result<Client, ConfigError> {
        Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.insecure_ssl)
            .build()
            .map_err(ConfigError::HttpClient)
    }

    /// Build the raw-target client used for dispatch
    pub fn dispatch_client(&self) -> Result<DispatchClient, ConfigError> {
        transport::dispatch_client(self.insecure_ssl).map_err(ConfigError::Tls)
    }
}
