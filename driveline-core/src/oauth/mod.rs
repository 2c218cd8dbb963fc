//! OAuth 2.0 plumbing for the identity provider.
//!
//! - [`create_oauth_client`] - builds an `oauth2` client for the configured authority
//! - [`pkce`] - authorization code flow with PKCE
//! - [`token_set_from_response`] - converts a token endpoint response
//! - [`IdTokenClaims`] - who signed in, read from the `id_token`

use chrono::Utc;
use oauth2::{
    AuthType, AuthUrl, Client, ClientId, ExtraTokenFields, RedirectUrl, StandardRevocableToken,
    StandardTokenResponse, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::identity::IdentityError;
use crate::token::{Token, TokenSet};

mod id_token;
pub mod pkce;

pub use id_token::IdTokenClaims;

/// Non-standard fields of the token response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

/// Token endpoint response, including the `id_token` when `openid` was
/// requested.
pub type OAuthTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// `oauth2` client whose token responses keep the `id_token`.
pub type OAuthClient = Client<
    BasicErrorResponse,
    OAuthTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Create a public (secret-less) OAuth2 client for the configured authority.
pub fn create_oauth_client(
    config: &AppConfig,
    redirect_uri: Option<&str>,
) -> Result<OAuthClient, IdentityError> {
    let auth_url = AuthUrl::new(config.authorize_url()).map_err(|e| {
        IdentityError::Authentication {
            message: format!("invalid authorize URL: {}", e),
        }
    })?;

    let token_url = TokenUrl::new(config.token_url()).map_err(|e| {
        IdentityError::Authentication {
            message: format!("invalid token URL: {}", e),
        }
    })?;

    let mut client = OAuthClient::new(
        ClientId::new(config.application_id.trim().to_string()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_auth_type(AuthType::RequestBody);

    if let Some(redirect) = redirect_uri {
        let redirect_url = RedirectUrl::new(redirect.to_string()).map_err(|e| {
            IdentityError::Authentication {
                message: format!("invalid redirect URI: {}", e),
            }
        })?;
        client = client.set_redirect_uri(redirect_url);
    }

    Ok(client)
}

/// Convert a token endpoint response into a [`TokenSet`].
///
/// `requested_scopes` stands in for the granted scopes when the endpoint
/// omits `scope`; `previous_refresh` is kept when no new refresh token
/// is issued.
pub fn token_set_from_response(
    response: &OAuthTokenResponse,
    requested_scopes: &[String],
    previous_refresh: Option<&str>,
) -> Result<TokenSet, IdentityError> {
    let scopes = response
        .scopes()
        .map(|s| s.iter().map(|scope| scope.to_string()).collect())
        .unwrap_or_else(|| requested_scopes.to_vec());

    let mut token = Token::new(response.access_token().secret().to_string()).with_scopes(scopes);

    if let Some(duration) = response.expires_in() {
        let expires_in =
            chrono::Duration::from_std(duration).map_err(|e| IdentityError::Authentication {
                message: format!("invalid expiration duration: {}", e),
            })?;
        token = token.with_expiry(Utc::now() + expires_in);
    }

    let mut token_set = TokenSet::new(token);
    match (response.refresh_token(), previous_refresh) {
        (Some(fresh), _) => token_set = token_set.with_refresh_token(fresh.secret()),
        (None, Some(previous)) => token_set = token_set.with_refresh_token(previous),
        (None, None) => {}
    }

    Ok(token_set)
}

/// Claims of the response's `id_token`, if it carried one.
pub fn claims_from_response(
    response: &OAuthTokenResponse,
) -> Result<Option<IdTokenClaims>, IdentityError> {
    response
        .extra_fields()
        .id_token
        .as_deref()
        .map(IdTokenClaims::decode)
        .transpose()
}
