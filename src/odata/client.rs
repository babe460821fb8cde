//! OData Client module
//!
//! Session-bearing request dispatch against the service root.

use crate::auth::{SessionId, Step};
use crate::config::RuntimeConfig;
use crate::odata::target::RequestTarget;
use crate::odata::transport::DispatchClient;
use http::header::{HeaderMap, COOKIE};
use http::{response, Method, Request, StatusCode, Uri, Version};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};

/// Upper bound for one backoff pause between retries
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// OData client errors
#[derive(Error, Debug)]
pub enum ODataError {
    #[error("{} request failed: {}", Step::Dispatch, .0)]
    HttpError(#[from] hyper_util::client::legacy::Error),

    #[error("{} response body failed: {}", Step::Dispatch, .0)]
    BodyError(#[from] hyper::Error),

    #[error("{} request timed out after {:?}", Step::Dispatch, .0)]
    Timeout(Duration),

    #[error("Invalid request target: {0}")]
    InvalidTarget(String),
}

/// Fully read response of one dispatched request
#[derive(Debug, Clone)]
pub struct ODataResponse {
    pub method: Method,
    /// Raw URL as requested, before rewriting
    pub url: String,
    pub version: Version,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// OData client for session-authenticated requests
#[derive(Debug)]
pub struct ODataClient {
    http_client: DispatchClient,
    service_root: String,
    origin: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl ODataClient {
    /// Create a new OData client for the configured service root
    pub fn new(config: &RuntimeConfig, http_client: DispatchClient) -> Self {
        Self {
            http_client,
            service_root: config.service_root.clone(),
            origin: config.origin.clone(),
            timeout: config.timeout,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    /// Get service root URL
    pub fn service_root(&self) -> &str {
        &self.service_root
    }

    /// Raw URL for a path relative to the service root
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.service_root, path)
    }

    /// GET a path relative to the service root
    pub async fn get(&self, path: &str, session: &SessionId) -> Result<ODataResponse, ODataError> {
        self.dispatch(Method::GET, &self.url_for(path), session).await
    }

    /// Send `method` to `raw_url` with the session cookie attached.
    ///
    /// The request line carries the opaque target byte for byte: no
    /// percent-encoding beyond `%20` in the query and no dot-segment
    /// removal. A `#` cannot be sent and is rejected.
    ///
    /// The body is read to the end before returning, so the connection is
    /// released whether or not the caller looks at it.
    pub async fn dispatch(
        &self,
        method: Method,
        raw_url: &str,
        session: &SessionId,
    ) -> Result<ODataResponse, ODataError> {
        let uri = self.request_uri(raw_url)?;

        tracing::debug!("Request: {} {}", method, raw_url);

        let (parts, body) = self.execute_with_retry(&method, &uri, session).await?;

        tracing::debug!("Response: {} ({} bytes)", parts.status, body.len());

        Ok(ODataResponse {
            method,
            url: raw_url.to_string(),
            version: parts.version,
            status: parts.status,
            headers: parts.headers,
            body: body.to_vec(),
        })
    }

    fn request_uri(&self, raw_url: &str) -> Result<Uri, ODataError> {
        let target = RequestTarget::parse(raw_url).request_target();
        if target.contains('#') {
            return Err(ODataError::InvalidTarget(format!(
                "{}: '#' is not allowed in a request target",
                raw_url
            )));
        }

        format!("{}{}", self.origin, target)
            .parse::<Uri>()
            .map_err(|e| ODataError::InvalidTarget(format!("{}: {}", raw_url, e)))
    }

    /// Send the request, retrying transport failures up to `max_retries` times
    async fn execute_with_retry(
        &self,
        method: &Method,
        uri: &Uri,
        session: &SessionId,
    ) -> Result<(response::Parts, Bytes), ODataError> {
        let mut attempt = 0;
        let mut delay = self.retry_delay_ms.min(MAX_RETRY_DELAY_MS);

        loop {
            attempt += 1;

            match self.execute(method, uri, session).await {
                Err(ODataError::HttpError(e)) if attempt <= self.max_retries => {
                    tracing::warn!(
                        "Request failed ({}), attempt {}/{}, retrying in {} ms",
                        e,
                        attempt,
                        self.max_retries + 1,
                        delay
                    );

                    sleep(Duration::from_millis(delay)).await;
                    delay = next_delay(delay);
                }
                result => return result,
            }
        }
    }

    async fn execute(
        &self,
        method: &Method,
        uri: &Uri,
        session: &SessionId,
    ) -> Result<(response::Parts, Bytes), ODataError> {
        let mut request = Request::builder().method(method.clone()).uri(uri.clone());
        if !session.is_empty() {
            request = request.header(COOKIE, session.cookie());
        }
        let request = request
            .body(Empty::new())
            .map_err(|e| ODataError::InvalidTarget(format!("{}: {}", uri, e)))?;

        let exchange = async {
            let response = self.http_client.request(request).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, ODataError>((parts, body))
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| ODataError::Timeout(self.timeout))?
    }
}

/// Exponential backoff, capped at [`MAX_RETRY_DELAY_MS`]
fn next_delay(delay: u64) -> u64 {
    delay.saturating_mul(2).min(MAX_RETRY_DELAY_MS)
}
