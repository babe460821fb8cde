//! oget library
//!
//! Minimal client for Intrexx provided OData services: challenge-response
//! login with a keyed salted digest, session-cookie requests and logout.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod odata;
pub mod runner;

pub use auth::{AuthClient, AuthError, AuthMode, Credentials, KeyedSaltedHasher, SessionId};
pub use config::{Config, ConfigError, RuntimeConfig};
pub use error::Error;
pub use odata::{ODataClient, ODataError, ODataResponse, RequestTarget};
