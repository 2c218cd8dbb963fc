//! Domain model types for Driveline.
//!
//! This module defines the identity-side types shared by the stores and
//! the identity provider:
//! - [`AccountId`] - Opaque identifier issued for a signed-in account
//! - [`Account`] - Cached account reference with its authority and scopes
//! - [`CredentialType`] - Kind of credential persisted for an account
//! - [`CredentialRef`] - Reference to a stored credential (storage key)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every credential storage key.
pub const KEY_PREFIX: &str = "driveline";

/// Opaque identifier for a cached account.
///
/// The identity provider issues these; callers should treat them as
/// opaque strings.
///
/// # Examples
///
/// ```
/// use driveline_core::AccountId;
///
/// let id = AccountId::new("3f1c0c8e-1111-4c1e-9f4e-2b7d3c9a0001");
/// assert_eq!(id.as_str(), "3f1c0c8e-1111-4c1e-9f4e-2b7d3c9a0001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random account ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the account ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A cached account reference.
///
/// At most one account is expected to be active, but the cache may hold
/// any number of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The account identifier.
    pub id: AccountId,

    /// Human-readable user name, when the provider reported one.
    #[serde(default)]
    pub username: Option<String>,

    /// Authority the account was issued by.
    pub authority: String,

    /// OAuth scopes granted to this account.
    pub scopes: Vec<String>,

    /// When the account was first cached.
    pub created_at: DateTime<Utc>,

    /// When a token was last acquired for the account.
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account with the current timestamp.
    pub fn new(id: AccountId, authority: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            id,
            username: None,
            authority: authority.into(),
            scopes,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    /// Attach a user name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Name to show for this account: the user name if known, else the id.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

/// Type of credential stored for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// OAuth access token (short-lived).
    AccessToken,

    /// OAuth refresh token (long-lived).
    RefreshToken,

    /// Access token expiry, as a Unix timestamp.
    TokenExpiry,

    /// Comma-separated scopes granted with the access token.
    TokenScopes,
}

impl CredentialType {
    /// All credential types persisted for an account.
    pub const ALL: [CredentialType; 4] = [
        CredentialType::AccessToken,
        CredentialType::RefreshToken,
        CredentialType::TokenExpiry,
        CredentialType::TokenScopes,
    ];

    /// Get the credential type as a string for storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::TokenExpiry => "token_expiry",
            Self::TokenScopes => "token_scopes",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    /// The account the credential belongs to.
    pub account: AccountId,

    /// The type of credential.
    pub credential_type: CredentialType,
}

impl CredentialRef {
    /// Create a new credential reference.
    pub fn new(account: impl Into<AccountId>, credential_type: CredentialType) -> Self {
        Self {
            account: account.into(),
            credential_type,
        }
    }

    /// Convert to a storage key.
    ///
    /// Keys follow the pattern: `driveline/{account}/{type}`
    pub fn to_key(&self) -> String {
        format!("{}/{}/{}", KEY_PREFIX, self.account, self.credential_type)
    }
}
