//! Top-level error type for Driveline.

use thiserror::Error;

use crate::account_store::AccountStoreError;
use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::remote::RemoteError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Any error produced by the library.
#[derive(Debug, Error)]
pub enum DrivelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("account store error: {0}")]
    Account(#[from] AccountStoreError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
