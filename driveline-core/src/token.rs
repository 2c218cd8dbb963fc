//! Bearer tokens and their persisted form.
//!
//! This module provides:
//! - [`Token`] - An access token with expiry and scopes
//! - [`TokenSet`] - An access token plus its optional refresh token
//! - [`TokenCache`] - Reads and writes token sets through a [`SecretStore`]

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AccountId, CredentialRef, CredentialType};
use crate::store::{Secret, SecretStore, StoreError};

/// Error type for token cache operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Storage error during token operations.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// A stored value could not be decoded.
    #[error("corrupt cached {credential} for {account}")]
    Corrupt { account: String, credential: String },
}

/// A single access token with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The token value.
    pub access_token: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// When this token expires (None if unknown or non-expiring).
    pub expires_at: Option<DateTime<Utc>>,

    /// OAuth scopes associated with this token.
    pub scopes: Vec<String>,
}

impl Token {
    /// Create a new bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    /// Set the expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }

    /// Check if this token will expire within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }
}

/// An access token and, when the provider issued one, a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// The current access token.
    pub access_token: Token,

    /// The refresh token (if available).
    pub refresh_token: Option<Secret>,

    /// When this token set was obtained.
    pub refreshed_at: DateTime<Utc>,
}

impl TokenSet {
    /// Create a new token set with just an access token.
    pub fn new(access_token: Token) -> Self {
        Self {
            access_token,
            refresh_token: None,
            refreshed_at: Utc::now(),
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }
}

/// Token set persistence on top of a [`SecretStore`].
///
/// Each field of a [`TokenSet`] is stored under its own
/// [`CredentialRef`] key so a keyring backend sees small independent
/// entries.
pub struct TokenCache<S: SecretStore> {
    store: S,
}

impl<S: SecretStore> TokenCache<S> {
    /// Wrap a secret store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn put(
        &self,
        account: &AccountId,
        cred_type: CredentialType,
        value: &str,
    ) -> Result<(), TokenError> {
        let key = CredentialRef::new(account.clone(), cred_type).to_key();
        self.store.set(&key, &Secret::new(value)).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        account: &AccountId,
        cred_type: CredentialType,
    ) -> Result<Option<Secret>, TokenError> {
        let key = CredentialRef::new(account.clone(), cred_type).to_key();
        Ok(self.store.get(&key).await?)
    }

    /// Load the cached token set for an account.
    ///
    /// Returns `Ok(None)` when no access token is cached.
    pub async fn load(&self, account: &AccountId) -> Result<Option<TokenSet>, TokenError> {
        let Some(access) = self.fetch(account, CredentialType::AccessToken).await? else {
            return Ok(None);
        };

        let mut token = Token::new(access.expose());

        if let Some(expiry) = self.fetch(account, CredentialType::TokenExpiry).await? {
            let expires_at = expiry
                .expose()
                .parse::<i64>()
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .ok_or_else(|| TokenError::Corrupt {
                    account: account.to_string(),
                    credential: CredentialType::TokenExpiry.to_string(),
                })?;
            token = token.with_expiry(expires_at);
        }

        if let Some(scopes) = self.fetch(account, CredentialType::TokenScopes).await? {
            let scopes = scopes
                .expose()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            token = token.with_scopes(scopes);
        }

        let mut token_set = TokenSet::new(token);
        if let Some(refresh) = self.fetch(account, CredentialType::RefreshToken).await? {
            token_set = token_set.with_refresh_token(refresh.expose());
        }

        Ok(Some(token_set))
    }

    /// Persist a token set, replacing whatever was cached for the account.
    pub async fn save(&self, account: &AccountId, token_set: &TokenSet) -> Result<(), TokenError> {
        self.put(
            account,
            CredentialType::AccessToken,
            token_set.access_token.access_token.expose(),
        )
        .await?;

        match token_set.access_token.expires_at {
            Some(expires_at) => {
                let timestamp = expires_at.timestamp().to_string();
                self.put(account, CredentialType::TokenExpiry, &timestamp)
                    .await?;
            }
            None => self.delete(account, CredentialType::TokenExpiry).await?,
        }

        if token_set.access_token.scopes.is_empty() {
            self.delete(account, CredentialType::TokenScopes).await?;
        } else {
            let scopes = token_set.access_token.scopes.join(",");
            self.put(account, CredentialType::TokenScopes, &scopes)
                .await?;
        }

        match &token_set.refresh_token {
            Some(refresh) => {
                self.put(account, CredentialType::RefreshToken, refresh.expose())
                    .await?
            }
            None => self.delete(account, CredentialType::RefreshToken).await?,
        }

        Ok(())
    }

    async fn delete(&self, account: &AccountId, cred_type: CredentialType) -> Result<(), TokenError> {
        let key = CredentialRef::new(account.clone(), cred_type).to_key();
        self.store.delete(&key).await?;
        Ok(())
    }

    /// Remove every cached credential for an account.
    pub async fn clear(&self, account: &AccountId) -> Result<(), TokenError> {
        for cred_type in CredentialType::ALL {
            self.delete(account, cred_type).await?;
        }
        Ok(())
    }
}
