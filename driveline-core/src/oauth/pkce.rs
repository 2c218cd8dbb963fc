//! Authorization Code flow with PKCE (Proof Key for Code Exchange).
//!
//! 1. [`PkceFlow::build_authorization_url`] generates a verifier/challenge
//!    pair and the URL the user must visit.
//! 2. The user signs in and the provider redirects with a code.
//! 3. [`PkceFlow::exchange_code`] trades the code (plus verifier) for tokens.

use oauth2::{
    AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, Scope,
    reqwest::async_http_client,
};
use parking_lot::Mutex;

use super::{IdTokenClaims, claims_from_response, create_oauth_client, token_set_from_response};
use crate::config::AppConfig;
use crate::identity::IdentityError;
use crate::token::TokenSet;

/// Tokens from a code exchange plus the identity they were issued to.
#[derive(Debug)]
pub struct CodeExchange {
    pub tokens: TokenSet,
    /// `None` when the response carried no `id_token`.
    pub claims: Option<IdTokenClaims>,
}

/// One run of the authorization code flow.
pub struct PkceFlow {
    config: AppConfig,
    redirect_uri: String,
    verifier: Mutex<Option<PkceCodeVerifier>>,
}

impl PkceFlow {
    pub fn new(config: AppConfig, redirect_uri: impl Into<String>) -> Self {
        Self {
            config,
            redirect_uri: redirect_uri.into(),
            verifier: Mutex::new(None),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the authorization URL and remember the PKCE verifier.
    ///
    /// Returns the URL and the CSRF state the redirect must echo back.
    pub fn build_authorization_url(
        &self,
        scopes: &[String],
        login_hint: Option<&str>,
    ) -> Result<(String, String), IdentityError> {
        let client = create_oauth_client(&self.config, Some(&self.redirect_uri))?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        *self.verifier.lock() = Some(pkce_verifier);

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_scopes(scopes.iter().cloned().map(Scope::new));

        if let Some(hint) = login_hint {
            request = request.add_extra_param("login_hint", hint);
        }

        let (url, csrf_state) = request.url();
        Ok((url.to_string(), csrf_state.secret().to_string()))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Fails if [`build_authorization_url`](Self::build_authorization_url)
    /// was not called first, or if the token endpoint rejects the code.
    pub async fn exchange_code(
        &self,
        code: impl Into<String>,
        scopes: &[String],
    ) -> Result<CodeExchange, IdentityError> {
        let verifier = self
            .verifier
            .lock()
            .take()
            .ok_or_else(|| IdentityError::Authentication {
                message: "PKCE verifier not found; authorization URL was never built".to_string(),
            })?;

        let client = create_oauth_client(&self.config, Some(&self.redirect_uri))?;

        let response = client
            .exchange_code(AuthorizationCode::new(code.into()))
            .set_pkce_verifier(verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| IdentityError::Authentication {
                message: format!("token exchange failed: {}", e),
            })?;

        Ok(CodeExchange {
            tokens: token_set_from_response(&response, scopes, None)?,
            claims: claims_from_response(&response)?,
        })
    }
}
