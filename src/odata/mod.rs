//! OData module
//!
//! Request dispatch and target rewriting for OData services

pub mod client;
pub mod target;
pub mod transport;

pub use client::{ODataClient, ODataError, ODataResponse};
pub use target::{with_format, RequestTarget};
pub use transport::DispatchClient;
