//! Per-request authentication for Graph calls.
//!
//! - [`RequestAuthenticator`] - attaches credentials to an outgoing request
//! - [`BearerAuthenticator`] - silent token per request, bound to one account
//! - [`AuthenticatorSlot`] - builds the authenticator at most once and
//!   forgets it on sign-out

use async_trait::async_trait;
use reqwest::RequestBuilder;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::identity::IdentityProvider;
use crate::model::Account;
use crate::remote::RemoteError;

/// Attaches credentials to a request before it is sent.
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    async fn authenticate(&self, request: RequestBuilder) -> Result<RequestBuilder, RemoteError>;
}

/// Acquires a token silently for every request and sends it as
/// `Authorization: Bearer`.
pub struct BearerAuthenticator<P: IdentityProvider> {
    provider: P,
    account: Account,
    scopes: Vec<String>,
}

impl<P: IdentityProvider> BearerAuthenticator<P> {
    pub fn new(provider: P, account: Account, scopes: Vec<String>) -> Self {
        Self {
            provider,
            account,
            scopes,
        }
    }

    /// The account tokens are acquired for.
    pub fn account(&self) -> &Account {
        &self.account
    }
}

#[async_trait]
impl<P: IdentityProvider> RequestAuthenticator for BearerAuthenticator<P> {
    async fn authenticate(&self, request: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        let result = self
            .provider
            .acquire_token_silent(&self.scopes, Some(&self.account))
            .await?;
        Ok(request.bearer_auth(result.token.access_token.expose()))
    }
}

impl<P: IdentityProvider> std::fmt::Debug for BearerAuthenticator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthenticator")
            .field("account", &self.account.id)
            .field("scopes", &self.scopes)
            .finish()
    }
}

enum SlotState<P: IdentityProvider> {
    Uninitialized,
    Ready(Arc<BearerAuthenticator<P>>),
}

/// Lazily built [`BearerAuthenticator`].
///
/// The state lives behind an async mutex held across the build, so at
/// most one initialization runs and later callers reuse its result.
pub struct AuthenticatorSlot<P: IdentityProvider> {
    state: Mutex<SlotState<P>>,
}

impl<P: IdentityProvider + Clone> AuthenticatorSlot<P> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Uninitialized),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, SlotState::Ready(_))
    }

    /// Return the authenticator, building it if needed.
    ///
    /// The authenticator is bound to `signed_in` when given, otherwise to
    /// the first cached account. Fails with [`RemoteError::NotInitialized`]
    /// when there is neither.
    pub async fn ensure_ready(
        &self,
        provider: &P,
        scopes: &[String],
        signed_in: Option<&Account>,
    ) -> Result<Arc<BearerAuthenticator<P>>, RemoteError> {
        let mut state = self.state.lock().await;
        if let SlotState::Ready(authenticator) = &*state {
            return Ok(Arc::clone(authenticator));
        }

        let account = match signed_in {
            Some(account) => account.clone(),
            None => Self::first_cached(provider).await?,
        };

        info!("Graph client bound to {}", account.display_name());
        let authenticator = Arc::new(BearerAuthenticator::new(
            provider.clone(),
            account,
            scopes.to_vec(),
        ));
        *state = SlotState::Ready(Arc::clone(&authenticator));
        Ok(authenticator)
    }

    /// Account the authenticator is bound to, if built.
    pub async fn bound_account(&self) -> Option<Account> {
        match &*self.state.lock().await {
            SlotState::Ready(authenticator) => Some(authenticator.account().clone()),
            SlotState::Uninitialized => None,
        }
    }

    async fn first_cached(provider: &P) -> Result<Account, RemoteError> {
        let accounts = provider
            .accounts()
            .await
            .map_err(|e| RemoteError::NotInitialized {
                message: format!("could not list cached accounts: {}", e),
            })?;
        debug!(
            "Initializing Graph client. Accounts in the cache: {}",
            accounts.len()
        );

        accounts
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotInitialized {
                message: "no cached account, sign in first".to_string(),
            })
    }

    /// Forget the authenticator; the next use rebuilds it.
    pub async fn reset(&self) {
        *self.state.lock().await = SlotState::Uninitialized;
    }
}

impl<P: IdentityProvider + Clone> Default for AuthenticatorSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}
