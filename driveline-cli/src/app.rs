//! Wiring of the core components for one CLI invocation.

use anyhow::{Context, Result};
use driveline_core::{
    AccountStore, AppConfig, ConfigError, DriveSession, EventSink, LoopbackInteraction,
    OAuthIdentityProvider, SecretStore, create_store,
};
use std::path::Path;
use tracing::debug;

/// Service name the token cache uses in the OS keyring.
pub const KEYRING_SERVICE: &str = "driveline";

pub type Provider = OAuthIdentityProvider<Box<dyn SecretStore>, LoopbackInteraction>;

/// Load configuration from `path`, or from the default location.
///
/// An unset application id is not an error here: the session reports it
/// and refuses to sign in.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    match config.validate() {
        Ok(()) | Err(ConfigError::InvalidApplicationId { .. }) => Ok(config),
        Err(e) => Err(e).context("Invalid configuration"),
    }
}

/// Build the identity provider: keyring token cache, JSON account cache and
/// the loopback browser flow.
pub fn build_provider(config: &AppConfig) -> Result<Provider> {
    let store = create_store(config.prefer_keyring, KEYRING_SERVICE);
    let accounts = AccountStore::load().context("Failed to load the account cache")?;
    debug!("Account cache at {:?}", accounts.path());

    let interaction = LoopbackInteraction::new(config.loopback_port, |url| {
        println!("Open this address in a browser to sign in:");
        println!();
        println!("    {}", url);
        println!();
    });
    let loopback_redirect = interaction.redirect_uri();

    let provider = OAuthIdentityProvider::new(config.clone(), store, accounts, interaction);
    Ok(match config.redirect_uri {
        Some(_) => provider,
        None => provider.with_redirect_uri(loopback_redirect),
    })
}

/// Build a session whose progress messages are printed as they arrive.
pub fn build_session(config: AppConfig) -> Result<DriveSession<Provider>> {
    let events = EventSink::default();
    events.set_callback(|event| println!("{}", event));

    let provider = build_provider(&config)?;
    DriveSession::new(config, provider, events).context("Failed to create the Graph client")
}
