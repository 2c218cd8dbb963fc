//! [`IdentityProvider`] backed by the credential store and the `oauth2` crate.

use async_trait::async_trait;
use oauth2::{
    RefreshToken, RequestTokenError, Scope, basic::BasicErrorResponseType,
    reqwest::async_http_client,
};
use tracing::{debug, info, warn};

use super::{AuthResult, IdentityError, IdentityProvider, Interaction};
use crate::account_store::{AccountStore, AccountStoreError};
use crate::config::AppConfig;
use crate::model::{Account, AccountId};
use crate::oauth::{create_oauth_client, pkce::PkceFlow, token_set_from_response};
use crate::store::SecretStore;
use crate::token::{TokenCache, TokenSet};

/// OAuth 2.0 identity provider for a public client.
///
/// Tokens live in a [`TokenCache`] over any [`SecretStore`]; account
/// metadata lives in an [`AccountStore`]. Silent acquisition uses the
/// cached access token while it is outside the expiry buffer and the
/// refresh grant after that. Interactive acquisition runs the
/// authorization code flow with PKCE through an [`Interaction`] and keys
/// the account by the `oid`/`tid` (or `sub`) claims of the `id_token`, so
/// signing in again as the same user replaces the cached entry.
pub struct OAuthIdentityProvider<S: SecretStore, I: Interaction> {
    config: AppConfig,
    redirect_uri: String,
    tokens: TokenCache<S>,
    accounts: AccountStore,
    interaction: I,
}

impl<S: SecretStore, I: Interaction> OAuthIdentityProvider<S, I> {
    /// Create a provider using the configured redirect URI.
    pub fn new(config: AppConfig, store: S, accounts: AccountStore, interaction: I) -> Self {
        let redirect_uri = config.redirect_uri();
        Self {
            config,
            redirect_uri,
            tokens: TokenCache::new(store),
            accounts,
            interaction,
        }
    }

    /// Override the redirect URI, e.g. with the loopback listener's.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn token_cache(&self) -> &TokenCache<S> {
        &self.tokens
    }

    pub fn account_store(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn interaction(&self) -> &I {
        &self.interaction
    }

    async fn refresh(
        &self,
        account: &Account,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<TokenSet, IdentityError> {
        debug!("Refreshing access token for {}", account.display_name());
        let client = create_oauth_client(&self.config, None)?;

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .request_async(async_http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response)
                    if *response.error() == BasicErrorResponseType::InvalidGrant =>
                {
                    IdentityError::interaction_required(format!(
                        "The refresh token was rejected: {}",
                        response
                    ))
                }
                other => IdentityError::authentication(format!("token refresh failed: {}", other)),
            })?;

        token_set_from_response(&response, scopes, Some(refresh_token))
    }

    fn touch(&self, account: &AccountId) {
        if let Err(e) = self.accounts.update_last_used(account) {
            warn!("Could not record last use of {}: {}", account, e);
        }
    }
}

#[async_trait]
impl<S, I> IdentityProvider for OAuthIdentityProvider<S, I>
where
    S: SecretStore + 'static,
    I: Interaction + 'static,
{
    async fn accounts(&self) -> Result<Vec<Account>, IdentityError> {
        Ok(self.accounts.list_accounts())
    }

    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: Option<&Account>,
    ) -> Result<AuthResult, IdentityError> {
        let account = account.ok_or_else(|| {
            IdentityError::interaction_required("No account was given for silent sign-in")
        })?;

        let cached = self.tokens.load(&account.id).await?.ok_or_else(|| {
            IdentityError::interaction_required(format!(
                "No cached token for {}",
                account.display_name()
            ))
        })?;

        if !cached.access_token.expires_within(self.config.expiry_buffer()) {
            debug!("Using cached access token for {}", account.display_name());
            self.touch(&account.id);
            return Ok(AuthResult {
                account: account.clone(),
                token: cached.access_token,
            });
        }

        let Some(refresh_token) = cached.refresh_token.as_ref() else {
            return Err(IdentityError::interaction_required(format!(
                "The access token for {} expired and no refresh token is cached",
                account.display_name()
            )));
        };

        let refreshed = self
            .refresh(account, refresh_token.expose(), scopes)
            .await?;
        self.tokens.save(&account.id, &refreshed).await?;
        self.touch(&account.id);
        info!("Refreshed access token for {}", account.display_name());

        Ok(AuthResult {
            account: account.clone(),
            token: refreshed.access_token,
        })
    }

    async fn acquire_token_interactive(
        &self,
        scopes: &[String],
    ) -> Result<AuthResult, IdentityError> {
        let flow = PkceFlow::new(self.config.clone(), self.redirect_uri.clone());
        let (url, state) =
            flow.build_authorization_url(scopes, self.config.login_hint.as_deref())?;

        info!("Starting interactive sign-in");
        let response = self.interaction.authorize(&url, flow.redirect_uri()).await?;

        if response.state.as_deref() != Some(state.as_str()) {
            return Err(IdentityError::authentication(
                "The sign-in redirect carried an unexpected state parameter",
            ));
        }

        let exchange = flow.exchange_code(response.code, scopes).await?;
        let claims = exchange.claims.unwrap_or_default();

        let id = claims.account_id().unwrap_or_else(|| {
            warn!("The token response carried no id_token; caching the account under a local id");
            AccountId::generate()
        });
        let username = claims
            .username()
            .map(str::to_string)
            .or_else(|| self.config.login_hint.clone());

        let mut account = Account::new(
            id,
            self.config.authority.clone(),
            exchange.tokens.access_token.scopes.clone(),
        );
        if let Some(username) = username {
            account = account.with_username(username);
        }

        self.tokens.save(&account.id, &exchange.tokens).await?;
        if self.accounts.upsert_account(account.clone())? {
            info!("Replaced cached account {}", account.display_name());
        } else {
            info!("Cached new account {}", account.display_name());
        }

        Ok(AuthResult {
            account,
            token: exchange.tokens.access_token,
        })
    }

    async fn remove_account(&self, account: &Account) -> Result<(), IdentityError> {
        self.tokens.clear(&account.id).await?;
        match self.accounts.remove_account(&account.id) {
            Ok(()) => {
                info!("Removed account {}", account.display_name());
                Ok(())
            }
            Err(AccountStoreError::NotFound { .. }) => {
                debug!("Account {} was already removed", account.id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_AUTHORITY;
    use crate::identity::AuthorizationResponse;
    use crate::store::MemoryStore;
    use crate::token::Token;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    struct NoInteraction;

    #[async_trait]
    impl Interaction for NoInteraction {
        async fn authorize(
            &self,
            _authorization_url: &str,
            _redirect_uri: &str,
        ) -> Result<AuthorizationResponse, IdentityError> {
            Err(IdentityError::authentication("user cancelled"))
        }
    }

    fn provider() -> OAuthIdentityProvider<Arc<MemoryStore>, NoInteraction> {
        let config = AppConfig {
            application_id: "4a1aa1d5-c567-49d0-ad0b-cd957a47f842".to_string(),
            ..AppConfig::default()
        };
        OAuthIdentityProvider::new(
            config,
            Arc::new(MemoryStore::new()),
            AccountStore::ephemeral(),
            NoInteraction,
        )
    }

    fn scopes() -> Vec<String> {
        vec!["User.Read".to_string()]
    }

    async fn cached_account(
        provider: &OAuthIdentityProvider<Arc<MemoryStore>, NoInteraction>,
        token_set: TokenSet,
    ) -> Account {
        let account = Account::new(AccountId::new("acct-1"), DEFAULT_AUTHORITY, scopes());
        provider.account_store().add_account(account.clone()).unwrap();
        provider
            .token_cache()
            .save(&account.id, &token_set)
            .await
            .unwrap();
        account
    }

    #[test]
    fn test_default_redirect_uri() {
        assert_eq!(
            provider().redirect_uri(),
            "msal4a1aa1d5-c567-49d0-ad0b-cd957a47f842://auth"
        );
        let overridden = provider().with_redirect_uri("http://localhost:8400");
        assert_eq!(overridden.redirect_uri(), "http://localhost:8400");
    }

    #[tokio::test]
    async fn test_silent_without_account_requires_interaction() {
        let err = provider()
            .acquire_token_silent(&scopes(), None)
            .await
            .unwrap_err();
        assert!(err.is_interaction_required());
    }

    #[tokio::test]
    async fn test_silent_without_cached_tokens_requires_interaction() {
        let provider = provider();
        let account = Account::new(AccountId::new("acct-1"), DEFAULT_AUTHORITY, scopes());
        let err = provider
            .acquire_token_silent(&scopes(), Some(&account))
            .await
            .unwrap_err();
        assert!(err.is_interaction_required());
    }

    #[tokio::test]
    async fn test_silent_returns_valid_cached_token() {
        let provider = provider();
        let token = Token::new("cached").with_expiry(Utc::now() + Duration::hours(1));
        let account = cached_account(&provider, TokenSet::new(token)).await;

        let result = provider
            .acquire_token_silent(&scopes(), Some(&account))
            .await
            .unwrap();

        assert_eq!(result.token.access_token.expose(), "cached");
        assert_eq!(result.account.id, account.id);
        let stored = provider.account_store().get_account(&account.id).unwrap();
        assert!(stored.last_used.is_some());
    }

    #[tokio::test]
    async fn test_silent_expired_without_refresh_requires_interaction() {
        let provider = provider();
        // Inside the five minute buffer counts as expired.
        let token = Token::new("stale").with_expiry(Utc::now() + Duration::minutes(1));
        let account = cached_account(&provider, TokenSet::new(token)).await;

        let err = provider
            .acquire_token_silent(&scopes(), Some(&account))
            .await
            .unwrap_err();
        assert!(err.is_interaction_required());
    }

    #[tokio::test]
    async fn test_interactive_failure_is_propagated() {
        let err = provider()
            .acquire_token_interactive(&scopes())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Authentication { .. }));
        assert!(provider().accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_account_clears_tokens() {
        let provider = provider();
        let token = Token::new("cached").with_expiry(Utc::now() + Duration::hours(1));
        let account =
            cached_account(&provider, TokenSet::new(token).with_refresh_token("r")).await;

        provider.remove_account(&account).await.unwrap();

        assert!(provider.accounts().await.unwrap().is_empty());
        assert!(provider.token_cache().load(&account.id).await.unwrap().is_none());
        assert!(provider.token_cache().store().is_empty());

        // A second removal is not an error.
        provider.remove_account(&account).await.unwrap();
    }
}
