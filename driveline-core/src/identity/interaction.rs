//! The user-facing half of interactive sign-in.
//!
//! An [`Interaction`] takes the authorization URL to the user and brings
//! back what the provider redirected with. The shipped
//! [`LoopbackInteraction`] shows the URL and waits for the browser to hit
//! `http://127.0.0.1:{port}`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::IdentityError;

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

/// Presents an authorization URL to the user and collects the redirect.
#[async_trait]
pub trait Interaction: Send + Sync {
    async fn authorize(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizationResponse, IdentityError>;
}

type Presenter = Arc<dyn Fn(&str) + Send + Sync>;

const SUCCESS_PAGE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Signed in</h1>\
    <p>You can close this window and return to Driveline.</p></body></html>";

const FAILURE_PAGE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Sign-in failed</h1>\
    <p>The identity provider returned an error.</p></body></html>";

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n";

/// Loopback redirect listener.
///
/// The redirect URI registered for the application must be
/// `http://localhost:{port}` (or `127.0.0.1`).
pub struct LoopbackInteraction {
    port: u16,
    timeout: Duration,
    presenter: Presenter,
}

impl LoopbackInteraction {
    /// Listen on `port`; `presenter` is handed the URL once the listener is up.
    pub fn new<F>(port: u16, presenter: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            port,
            timeout: Duration::from_secs(300),
            presenter: Arc::new(presenter),
        }
    }

    /// How long to wait for the browser before giving up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The redirect URI matching this listener.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    async fn accept_redirect(
        &self,
        listener: &TcpListener,
    ) -> Result<AuthorizationResponse, IdentityError> {
        loop {
            let (mut socket, _) = listener.accept().await.map_err(|e| {
                IdentityError::authentication(format!("failed to accept redirect: {}", e))
            })?;

            let mut buffer = [0; 4096];
            let n = socket.read(&mut buffer).await.map_err(|e| {
                IdentityError::authentication(format!("failed to read redirect: {}", e))
            })?;
            let request = String::from_utf8_lossy(&buffer[..n]);

            match parse_redirect(&request) {
                Some(Redirect::Code(response)) => {
                    let _ = socket.write_all(SUCCESS_PAGE).await;
                    return Ok(response);
                }
                Some(Redirect::Error(error)) => {
                    let _ = socket.write_all(FAILURE_PAGE).await;
                    return Err(IdentityError::authentication(format!(
                        "identity provider returned error: {}",
                        error
                    )));
                }
                // Favicon requests and the like.
                None => {
                    let _ = socket.write_all(BAD_REQUEST).await;
                }
            }
        }
    }
}

#[async_trait]
impl Interaction for LoopbackInteraction {
    async fn authorize(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizationResponse, IdentityError> {
        if redirect_uri != self.redirect_uri() {
            tracing::warn!(
                "Redirect URI {} does not match the loopback listener {}",
                redirect_uri,
                self.redirect_uri()
            );
        }

        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            IdentityError::authentication(format!("failed to bind to {}: {}", addr, e))
        })?;
        tracing::info!("Listening for the sign-in redirect on {}", addr);

        (self.presenter)(authorization_url);

        tokio::time::timeout(self.timeout, self.accept_redirect(&listener))
            .await
            .map_err(|_| {
                IdentityError::authentication(format!(
                    "no sign-in redirect received within {}s",
                    self.timeout.as_secs()
                ))
            })?
    }
}

enum Redirect {
    Code(AuthorizationResponse),
    Error(String),
}

fn parse_redirect(request: &str) -> Option<Redirect> {
    let target = request.lines().next()?.split_whitespace().nth(1)?;
    let url = url::Url::parse(&format!("http://localhost{}", target)).ok()?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Redirect::Error(match description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        }));
    }
    code.map(|code| Redirect::Code(AuthorizationResponse { code, state }))
}
