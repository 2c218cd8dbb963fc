//! Identity provider seam and the sign-in state machine.
//!
//! - [`IdentityProvider`] - the four operations the session needs from an
//!   identity library: list, silent acquire, interactive acquire, remove
//! - [`IdentityError`] - tagged failure; `InteractionRequired` is the one
//!   the sign-in fallback branches on
//! - [`IdentityClient`] - sign-in/sign-out over a provider
//! - [`OAuthIdentityProvider`] - provider backed by the token cache and
//!   the `oauth2` crate (with the `oauth` feature)

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::account_store::AccountStoreError;
use crate::model::Account;
use crate::token::{Token, TokenError};

mod client;
pub mod interaction;
#[cfg(feature = "oauth")]
mod oauth_provider;

pub use client::IdentityClient;
pub use interaction::{AuthorizationResponse, Interaction, LoopbackInteraction};
#[cfg(feature = "oauth")]
pub use oauth_provider::OAuthIdentityProvider;

/// Error type for identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Silent acquisition is impossible; the user has to sign in.
    #[error("{message}")]
    InteractionRequired { message: String },

    /// Any other identity-provider failure.
    #[error("{message}")]
    Authentication { message: String },

    /// Token cache failure.
    #[error("token cache error: {0}")]
    Token(#[from] TokenError),

    /// Account metadata failure.
    #[error("account cache error: {0}")]
    Account(#[from] AccountStoreError),
}

impl IdentityError {
    pub fn interaction_required(message: impl Into<String>) -> Self {
        Self::InteractionRequired {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn is_interaction_required(&self) -> bool {
        matches!(self, Self::InteractionRequired { .. })
    }
}

/// A successfully acquired token and the account it belongs to.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub account: Account,
    pub token: Token,
}

/// Operations the session needs from an identity library.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Cached accounts, oldest first.
    async fn accounts(&self) -> Result<Vec<Account>, IdentityError>;

    /// Obtain a token without user interaction.
    ///
    /// With no account, or when the cached credential cannot be renewed,
    /// this returns [`IdentityError::InteractionRequired`].
    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: Option<&Account>,
    ) -> Result<AuthResult, IdentityError>;

    /// Obtain a token by running the user-facing sign-in flow.
    async fn acquire_token_interactive(
        &self,
        scopes: &[String],
    ) -> Result<AuthResult, IdentityError>;

    /// Remove an account and its cached credentials.
    async fn remove_account(&self, account: &Account) -> Result<(), IdentityError>;
}

#[async_trait]
impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    async fn accounts(&self) -> Result<Vec<Account>, IdentityError> {
        (**self).accounts().await
    }

    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: Option<&Account>,
    ) -> Result<AuthResult, IdentityError> {
        (**self).acquire_token_silent(scopes, account).await
    }

    async fn acquire_token_interactive(
        &self,
        scopes: &[String],
    ) -> Result<AuthResult, IdentityError> {
        (**self).acquire_token_interactive(scopes).await
    }

    async fn remove_account(&self, account: &Account) -> Result<(), IdentityError> {
        (**self).remove_account(account).await
    }
}
