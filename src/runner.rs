//! Run orchestration
//!
//! Logs in once, dispatches every request path in order with the session,
//! then logs out. Logout is attempted whenever login succeeded; its failure
//! is only logged.

use crate::auth::{AuthClient, SessionId};
use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::odata::{with_format, ODataClient, ODataResponse};
use futures::StreamExt;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};

/// Where request paths come from
pub enum Requests<R> {
    /// One path given up front
    Single(String),
    /// One path per line; blank lines are skipped
    Lines(R),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Print status line and headers before each body
    pub dump_header: bool,
}

/// Log in, fetch every request path and log out, writing responses to `out`.
///
/// Returns the number of requests dispatched.
pub async fn run<R, W>(
    config: Arc<RuntimeConfig>,
    requests: Requests<R>,
    options: OutputOptions,
    out: &mut W,
) -> Result<usize, Error>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let http_client = config.http_client()?;
    let mut auth = AuthClient::new(&config, http_client);
    let odata = ODataClient::new(&config, config.dispatch_client()?);

    let session = auth.login(config.auth_mode, &config.credentials).await?;

    let result = dispatch_all(&odata, &session, &config, requests, options, out).await;

    if let Err(e) = auth.logout(&session).await {
        tracing::warn!("Logout failed: {}", e);
    }

    result
}

async fn dispatch_all<R, W>(
    odata: &ODataClient,
    session: &SessionId,
    config: &RuntimeConfig,
    requests: Requests<R>,
    options: OutputOptions,
    out: &mut W,
) -> Result<usize, Error>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let format = config.format.as_deref();

    match requests {
        Requests::Single(path) => {
            fetch(odata, session, format, &path, options, out).await?;
            Ok(1)
        }
        Requests::Lines(reader) => {
            let mut lines = FramedRead::new(reader, LinesCodec::new());
            let mut count = 0;

            while let Some(line) = lines.next().await {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }

                fetch(odata, session, format, &line, options, out).await?;
                count += 1;
            }

            Ok(count)
        }
    }
}

async fn fetch<W: Write>(
    odata: &ODataClient,
    session: &SessionId,
    format: Option<&str>,
    path: &str,
    options: OutputOptions,
    out: &mut W,
) -> Result<(), Error> {
    let path = match format {
        Some(format) => with_format(path, format),
        None => path.to_string(),
    };

    let response = odata.get(&path, session).await?;
    write_response(out, &response, options.dump_header)?;

    Ok(())
}

/// Print one response: request line, optional header dump, body.
pub fn write_response<W: Write>(
    out: &mut W,
    response: &ODataResponse,
    dump_header: bool,
) -> io::Result<()> {
    writeln!(out, "{} {}", response.method, response.url)?;

    if dump_header {
        write!(out, "{:?} {}\r\n", response.version, response.status)?;
        for (name, value) in &response.headers {
            write!(out, "{}: ", name)?;
            out.write_all(value.as_bytes())?;
            out.write_all(b"\r\n")?;
        }
        out.write_all(b"\r\n")?;
    }

    out.write_all(&response.body)?;
    out.write_all(b"\n\n")?;
    out.flush()
}
