//! # Driveline Core
//!
//! Session and token lifecycle for a Microsoft identity sign-in, plus a
//! small Microsoft Graph drive client.
//!
//! This crate provides:
//! - Secret and account storage ([`store`], [`account_store`], [`token`])
//! - The identity provider seam and the sign-in state machine ([`identity`])
//! - Per-request bearer authentication ([`auth`])
//! - Graph profile, listing and content requests ([`remote`])
//! - The [`DriveSession`] controller and its progress [`events`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use driveline_core::{AppConfig, DriveSession, DrivelineError, EventSink, IdentityProvider};
//!
//! async fn show_tree(provider: impl IdentityProvider + 'static) -> Result<(), DrivelineError> {
//!     let events = EventSink::default();
//!     let session = DriveSession::new(AppConfig::load()?, provider, events)?;
//!     if session.sign_in(false).await {
//!         session.describe_tree().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod account_store;
pub mod auth;
pub mod config;
pub mod drive;
pub mod error;
pub mod events;
pub mod identity;
pub mod model;
pub mod remote;
pub mod session;
pub mod store;
pub mod token;

#[cfg(feature = "oauth")]
pub mod oauth;

// Re-export commonly used types at crate root
pub use model::{Account, AccountId, CredentialRef, CredentialType};

pub use store::{MemoryStore, Secret, SecretStore, StoreError, create_store};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use token::{Token, TokenCache, TokenError, TokenSet};

pub use account_store::{AccountStore, AccountStoreError};

pub use config::{AppConfig, ConfigError};

pub use events::{Event, EventSink, EventStream, Severity};

pub use session::Session;

pub use identity::{
    AuthResult, AuthorizationResponse, IdentityClient, IdentityError, IdentityProvider,
    Interaction, LoopbackInteraction,
};

#[cfg(feature = "oauth")]
pub use identity::OAuthIdentityProvider;

pub use auth::{AuthenticatorSlot, BearerAuthenticator, RequestAuthenticator};

pub use remote::{GraphClient, RemoteError, RemoteItem, UserProfile};

pub use drive::DriveSession;

pub use error::DrivelineError;
