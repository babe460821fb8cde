//! Crate-level error for a complete run

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::odata::ODataError;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    OData(#[from] ODataError),

    #[error("Failed to read request paths: {0}")]
    Input(#[from] LinesCodecError),

    #[error("Failed to write response: {0}")]
    Output(#[from] std::io::Error),
}
