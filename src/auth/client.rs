//! Session authentication
//!
//! Runs the `$challenge` / login / `$logout` handshake against the service
//! root and owns the `co_SId` session cookie for the lifetime of a run.

use crate::auth::ksh::KeyedSaltedHasher;
use crate::config::RuntimeConfig;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Name of the session cookie issued by the service
pub const SESSION_COOKIE: &str = "co_SId";

const USERNAME_HEADER: &str = "rq_username";
const CHALLENGE_HEADER: &str = "Challenge";
const SALT_HEADER: &str = "Salt";

/// Protocol step, used to name the failing call in errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Challenge,
    Login,
    Dispatch,
    Logout,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Challenge => "challenge",
            Step::Login => "login",
            Step::Dispatch => "dispatch",
            Step::Logout => "logout",
        };
        f.write_str(name)
    }
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login denied (401)")]
    Denied,

    #[error("Login failed with status {0}")]
    Failed(u16),

    #[error("{step} request failed: {source}")]
    Transport {
        step: Step,
        #[source]
        source: reqwest::Error,
    },

    #[error("Logout reported status {0}")]
    LogoutRejected(u16),

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: AuthState,
    },
}

impl AuthError {
    fn transport(step: Step) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| AuthError::Transport { step, source }
    }
}

/// Login strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Anonymous access, no authorization header
    None,
    /// Plain HTTP Basic with the password
    Basic,
    /// `$challenge` handshake with a keyed salted digest
    #[default]
    #[serde(alias = "intrexx")]
    #[value(alias = "intrexx")]
    Challenge,
}

/// Username and password, supplied once per run
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque `co_SId` value; empty when the server issued none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Cookie` header value carrying this session
    pub fn cookie(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.0)
    }

    /// Last `co_SId` cookie set by `response`, if any
    pub(crate) fn from_response(response: &Response) -> Option<Self> {
        response
            .cookies()
            .filter(|c| c.name() == SESSION_COOKIE)
            .last()
            .map(|c| Self::new(c.value()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-issued nonces for one login attempt
#[derive(Debug, Clone, Default)]
pub struct Challenge {
    pub challenge: String,
    pub salt: String,
    /// Session id the server may already have opened during the challenge
    pub session: SessionId,
}

impl Challenge {
    /// Uppercase hex digest proving knowledge of `password`
    pub fn proof(&self, password: &str) -> String {
        let digest = KeyedSaltedHasher::sha1().digest(
            password.as_bytes(),
            self.salt.as_bytes(),
            self.challenge.as_bytes(),
        );
        hex::encode_upper(digest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    ChallengeIssued,
    Authenticated,
    LoggedOut,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::ChallengeIssued => "challenge issued",
            AuthState::Authenticated => "authenticated",
            AuthState::LoggedOut => "logged out",
        };
        f.write_str(name)
    }
}

/// `Authorization` header value for HTTP Basic
fn basic_auth(username: &str, secret: &str) -> String {
    let encoded = general_purpose::STANDARD.encode(format!("{}:{}", username, secret));
    format!("Basic {}", encoded)
}

/// Read the body to the end so the connection is released before the next call.
async fn drain(response: Response, step: Step) -> Result<(), AuthError> {
    response.bytes().await.map_err(AuthError::transport(step))?;
    Ok(())
}

/// Client for the login handshake
#[derive(Debug)]
pub struct AuthClient {
    http_client: Client,
    service_root: String,
    state: AuthState,
    session: SessionId,
}

impl AuthClient {
    /// Create a new auth client for the configured service root
    pub fn new(config: &RuntimeConfig, http_client: Client) -> Self {
        Self {
            http_client,
            service_root: config.service_root.clone(),
            state: AuthState::Unauthenticated,
            session: SessionId::default(),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Session captured by the last successful login
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Ask the server for a challenge and salt for `username`
    pub async fn fetch_challenge(&mut self, username: &str) -> Result<Challenge, AuthError> {
        let url = format!("{}/$challenge", self.service_root);
        tracing::debug!("Requesting challenge: {}", url);

        let response = self
            .http_client
            .get(&url)
            .header(USERNAME_HEADER, username)
            .send()
            .await
            .map_err(AuthError::transport(Step::Challenge))?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let challenge = Challenge {
            challenge: header(CHALLENGE_HEADER),
            salt: header(SALT_HEADER),
            session: SessionId::from_response(&response).unwrap_or_default(),
        };

        if challenge.challenge.is_empty() {
            tracing::warn!("Challenge response ({}) carried no challenge", response.status());
        }

        drain(response, Step::Challenge).await?;
        self.state = AuthState::ChallengeIssued;

        Ok(challenge)
    }

    /// Log in with `mode` and return the session id.
    ///
    /// The id may be empty when the server grants access without a session,
    /// e.g. anonymous access.
    pub async fn login(
        &mut self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<SessionId, AuthError> {
        if !matches!(
            self.state,
            AuthState::Unauthenticated | AuthState::ChallengeIssued
        ) {
            return Err(AuthError::InvalidState {
                action: "log in",
                state: self.state,
            });
        }

        let (authorization, carried) = match mode {
            AuthMode::Challenge => {
                tracing::info!("Using challenge authentication");
                let challenge = self.fetch_challenge(credentials.username()).await?;
                let proof = challenge.proof(credentials.password());
                (Some(basic_auth(credentials.username(), &proof)), challenge.session)
            }
            AuthMode::Basic => {
                tracing::info!("Using basic authentication");
                (
                    Some(basic_auth(credentials.username(), credentials.password())),
                    SessionId::default(),
                )
            }
            AuthMode::None => {
                tracing::info!("Using anonymous access");
                (None, SessionId::default())
            }
        };

        let mut request = self.http_client.get(format!("{}/", self.service_root));
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if !carried.is_empty() {
            request = request.header(COOKIE, carried.cookie());
        }

        let result = request.send().await.map_err(AuthError::transport(Step::Login));
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.state = AuthState::Unauthenticated;
                return Err(e);
            }
        };

        let status = response.status();
        let issued = SessionId::from_response(&response);
        let drained = drain(response, Step::Login).await;

        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                self.state = AuthState::Unauthenticated;
                return Err(AuthError::Denied);
            }
            status => {
                self.state = AuthState::Unauthenticated;
                return Err(AuthError::Failed(status.as_u16()));
            }
        }

        if let Err(e) = drained {
            self.state = AuthState::Unauthenticated;
            return Err(e);
        }

        let session = issued.unwrap_or(carried);
        tracing::info!("Session established");
        tracing::debug!("Session ID: {}", session);

        self.session = session.clone();
        self.state = AuthState::Authenticated;

        Ok(session)
    }

    /// End `session` on the server.
    ///
    /// An empty session makes no request. The client ends in `LoggedOut`
    /// whatever the server answers.
    pub async fn logout(&mut self, session: &SessionId) -> Result<(), AuthError> {
        if session.is_empty() {
            self.state = AuthState::LoggedOut;
            return Ok(());
        }

        let url = format!("{}/$logout", self.service_root);
        let result = self
            .http_client
            .get(&url)
            .header(COOKIE, session.cookie())
            .send()
            .await;
        self.state = AuthState::LoggedOut;

        let response = result.map_err(AuthError::transport(Step::Logout))?;
        let status = response.status();
        drain(response, Step::Logout).await?;

        if !status.is_success() {
            return Err(AuthError::LogoutRejected(status.as_u16()));
        }

        tracing::info!("Session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const PROOF_AUTH: &str = "Basic b2RhdGE6RUY4OUUzODZDQjNEOTQ5M0QwNDk0NjU5MkE0NjBERkU0M0NEOEMzOA==";
    const BASIC_AUTH: &str = "Basic b2RhdGE6c2VjcmV0";

    fn client_for(root: &str) -> AuthClient {
        let config = Config {
            service_url: Some(root.to_string()),
            ..Default::default()
        }
        .to_runtime()
        .unwrap();
        AuthClient::new(&config, Client::new())
    }

    fn credentials() -> Credentials {
        Credentials::new("odata", "secret")
    }

    #[test]
    fn test_challenge_proof() {
        let challenge = Challenge {
            challenge: "chal99".to_string(),
            salt: "ab12".to_string(),
            session: SessionId::default(),
        };
        assert_eq!(
            challenge.proof("secret"),
            "EF89E386CB3D9493D04946592A460DFE43CD8C38"
        );
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth("odata", "secret"), BASIC_AUTH);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", credentials());
        assert!(debug.contains("odata"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn test_challenge_login() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/$challenge"))
            .and(header("rq_username", "odata"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Challenge", "chal99")
                    .insert_header("Salt", "ab12")
                    .insert_header("Set-Cookie", "co_SId=S1; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .and(header("Authorization", PROOF_AUTH))
            .and(header("Cookie", "co_SId=S1"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Set-Cookie", "co_SId=S2; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let session = client.login(AuthMode::Challenge, &credentials()).await.unwrap();

        assert_eq!(session.as_str(), "S2");
        assert_eq!(client.session(), &session);
        assert_eq!(client.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_challenge_session_carried_when_login_sets_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/$challenge"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Challenge", "chal99")
                    .insert_header("Salt", "ab12")
                    .insert_header("Set-Cookie", "co_SId=S1"),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let session = client.login(AuthMode::Challenge, &credentials()).await.unwrap();

        assert_eq!(session.as_str(), "S1");
    }

    #[tokio::test]
    async fn test_fetch_challenge_reads_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/$challenge"))
            .and(header("rq_username", "admin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Challenge", "c-1")
                    .insert_header("Salt", "s-1"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let challenge = client.fetch_challenge("admin").await.unwrap();

        assert_eq!(challenge.challenge, "c-1");
        assert_eq!(challenge.salt, "s-1");
        assert!(challenge.session.is_empty());
        assert_eq!(client.state(), AuthState::ChallengeIssued);
    }

    #[tokio::test]
    async fn test_basic_login_skips_challenge() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/$challenge"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .and(header("Authorization", BASIC_AUTH))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Set-Cookie", "co_SId=B1; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let session = client.login(AuthMode::Basic, &credentials()).await.unwrap();

        assert_eq!(session.as_str(), "B1");
    }

    #[tokio::test]
    async fn test_anonymous_login_sends_no_authorization() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let session = client.login(AuthMode::None, &credentials()).await.unwrap();

        assert!(session.is_empty());
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
        assert!(requests[0].headers.get("cookie").is_none());
    }

    #[tokio::test]
    async fn test_login_denied() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("Set-Cookie", "co_SId=NOPE; Path=/"),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let result = client.login(AuthMode::Basic, &credentials()).await;

        assert!(matches!(result, Err(AuthError::Denied)));
        assert!(client.session().is_empty());
        assert_eq!(client.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_login_failed_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let result = client.login(AuthMode::Basic, &credentials()).await;

        assert!(matches!(result, Err(AuthError::Failed(503))));
    }

    #[tokio::test]
    async fn test_login_transport_error_names_step() {
        let mut client = client_for("http://127.0.0.1:1/svc");
        let err = client.login(AuthMode::Basic, &credentials()).await.unwrap_err();

        assert!(matches!(err, AuthError::Transport { step: Step::Login, .. }));
        assert!(err.to_string().starts_with("login request failed"));
    }

    #[tokio::test]
    async fn test_second_login_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        client.login(AuthMode::None, &credentials()).await.unwrap();
        let again = client.login(AuthMode::None, &credentials()).await;

        assert!(matches!(
            again,
            Err(AuthError::InvalidState {
                state: AuthState::Authenticated,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_logout_without_session_is_noop() {
        let server = MockServer::start().await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        client.logout(&SessionId::default()).await.unwrap();

        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(client.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_logout_sends_session_cookie() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/$logout"))
            .and(header("Cookie", "co_SId=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        client.logout(&SessionId::new("abc")).await.unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 1);
        assert_eq!(client.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_logout_rejected_still_logged_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/svc/$logout"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut client = client_for(&format!("{}/svc", server.uri()));
        let result = client.logout(&SessionId::new("abc")).await;

        assert!(matches!(result, Err(AuthError::LogoutRejected(500))));
        assert_eq!(client.state(), AuthState::LoggedOut);
    }
}
