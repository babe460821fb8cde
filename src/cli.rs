//! Command line interface
//!
//! Flags keep the names of the original tool (`-serviceUrl`, `-entityPath`,
//! `-fmt`, ...) as long options.

use crate::auth::AuthMode;
use crate::config::{Config, ConfigError};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "oget",
    version,
    about = "A minimalistic OData command line client for Intrexx provided OData services"
)]
pub struct Cli {
    /// The service endpoint root URL (e.g. http://host:port/servicename.svc)
    #[arg(long = "serviceUrl", visible_alias = "service-url", env = "OGET_SERVICE_URL")]
    pub service_url: Option<String>,

    /// The entity collection path with optional query string (e.g. "/EntitySet?$filter=ID eq 1").
    /// Paths are read line by line from stdin when omitted.
    #[arg(long = "entityPath", visible_alias = "entity-path")]
    pub entity_path: Option<String>,

    /// The response format, sent as $format
    #[arg(long = "fmt")]
    pub format: Option<String>,

    /// The auth type
    #[arg(long, value_enum)]
    pub auth: Option<AuthMode>,

    /// The username
    #[arg(long, env = "OGET_USER")]
    pub user: Option<String>,

    /// The password
    #[arg(long = "pwd", env = "OGET_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Dump response headers
    #[arg(long = "dumpHeader", visible_alias = "dump-header")]
    pub dump_header: bool,

    /// Print verbose log messages
    #[arg(long)]
    pub verbose: bool,

    /// TOML config file (defaults to ./oget.toml when present)
    #[arg(long, env = "OGET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout_secs: Option<u64>,

    /// Retries for requests that fail to reach the server
    #[arg(long = "retries")]
    pub max_retries: Option<u32>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
}

impl Cli {
    /// Settings given on the command line, as a config layer
    pub fn layer(&self) -> Config {
        Config {
            service_url: self.service_url.clone(),
            auth: self.auth,
            user: self.user.clone(),
            password: self.password.clone(),
            format: self.format.clone(),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            retry_delay_ms: None,
            insecure_ssl: self.insecure.then_some(true),
        }
    }

    /// Config file layer with the command line on top
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let base = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_default()?,
        };
        Ok(base.overlay(self.layer()))
    }
}
