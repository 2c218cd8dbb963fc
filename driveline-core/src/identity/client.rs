//! Sign-in/sign-out state machine.

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info};

use super::{IdentityError, IdentityProvider};
use crate::config::AppConfig;
use crate::events::EventSink;
use crate::model::Account;
use crate::session::Session;

/// Owns the session and drives an [`IdentityProvider`] through sign-in
/// and sign-out.
///
/// Sign-in and sign-out are serialized by an operation lock, so a
/// concurrent caller waits for the transition in flight and then sees its
/// outcome.
pub struct IdentityClient<P: IdentityProvider> {
    provider: P,
    config: AppConfig,
    scopes: Vec<String>,
    events: EventSink,
    session: Mutex<Session>,
    account: Mutex<Option<Account>>,
    op_lock: AsyncMutex<()>,
}

impl<P: IdentityProvider> IdentityClient<P> {
    pub fn new(provider: P, config: AppConfig, events: EventSink) -> Self {
        let scopes = config.requested_scopes();
        Self {
            provider,
            config,
            scopes,
            events,
            session: Mutex::new(Session::new()),
            account: Mutex::new(None),
            op_lock: AsyncMutex::new(()),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Scopes requested for every token.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.lock().is_signed_in()
    }

    /// The account the current session signed in with.
    pub fn account(&self) -> Option<Account> {
        self.account.lock().clone()
    }

    /// Whether the application id is usable for sign-in.
    pub fn is_configured(&self) -> bool {
        self.config.validate_application_id().is_ok()
    }

    /// Sign in, silently if possible.
    ///
    /// Returns `true` when a token was acquired (or the session was already
    /// signed in). With `silent_only`, an interaction-required outcome is a
    /// failure instead of a prompt.
    pub async fn sign_in(&self, silent_only: bool) -> bool {
        let _op = self.begin_transition().await;
        self.sign_in_locked(silent_only).await
    }

    /// Hold the operation lock so a caller can extend a sign-in or
    /// sign-out with its own state changes.
    pub(crate) async fn begin_transition(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    /// [`sign_in`](Self::sign_in) for a caller holding
    /// [`begin_transition`](Self::begin_transition).
    pub(crate) async fn sign_in_locked(&self, silent_only: bool) -> bool {
        if self.is_signed_in() {
            debug!("Sign-in requested while already signed in");
            return true;
        }

        if !self.is_configured() {
            self.events
                .error("Cannot log on, the Client ID has not been set");
            return false;
        }

        match self.acquire(silent_only).await {
            Ok(account) => {
                info!("Session signed in as {}", account.display_name());
                *self.account.lock() = Some(account);
                self.session.lock().mark_signed_in();
                true
            }
            Err(e) => {
                self.events
                    .error(format!("Authentication failed. Exception message: {}", e));
                self.session.lock().reset();
                *self.account.lock() = None;
                false
            }
        }
    }

    async fn acquire(&self, silent_only: bool) -> Result<Account, IdentityError> {
        let accounts = self.provider.accounts().await?;
        self.events
            .info(format!("Client accounts in the cache: {}.", accounts.len()));
        let candidate = accounts.into_iter().next();

        let silent = self
            .provider
            .acquire_token_silent(&self.scopes, candidate.as_ref())
            .await;

        match silent {
            Ok(result) => {
                self.events.info("User already signed in.");
                self.events.info(format!(
                    "Successful silent authentication for: {}",
                    result.account.display_name()
                ));
                Ok(result.account)
            }
            Err(IdentityError::InteractionRequired { message }) => {
                self.events.warn(format!(
                    "Silent token request failed, user needs to sign-in: {}",
                    message
                ));
                if silent_only {
                    return Err(IdentityError::interaction_required(message));
                }

                self.events.info("Starting interactive sign-in");
                let result = self.provider.acquire_token_interactive(&self.scopes).await?;
                self.events.info(format!(
                    "Successful interactive authentication for: {}",
                    result.account.display_name()
                ));

                if let Some(stale) = candidate.filter(|a| a.id != result.account.id) {
                    self.forget_stale(&stale).await;
                }
                Ok(result.account)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a cached account that needed interaction, so the next silent
    /// sign-in starts from the account that replaced it.
    async fn forget_stale(&self, stale: &Account) {
        match self.provider.remove_account(stale).await {
            Ok(()) => {
                self.events.info(format!(
                    "Removed cached account {}, it can no longer sign in silently",
                    stale.display_name()
                ));
            }
            Err(e) => {
                self.events.warn(format!(
                    "Could not remove stale account {}: {}",
                    stale.display_name(),
                    e
                ));
            }
        }
    }

    /// Remove every cached account and return to the signed-out state.
    ///
    /// Provider failures are reported through the event sink; the session
    /// is reset either way.
    pub async fn sign_out(&self) {
        let _op = self.begin_transition().await;
        self.sign_out_locked().await;
    }

    /// [`sign_out`](Self::sign_out) for a caller holding
    /// [`begin_transition`](Self::begin_transition).
    pub(crate) async fn sign_out_locked(&self) {
        match self.provider.accounts().await {
            Ok(accounts) => self.remove_all(accounts).await,
            Err(e) => {
                self.events
                    .error(format!("Could not list cached accounts: {}", e));
            }
        }

        self.session.lock().reset();
        *self.account.lock() = None;
        info!("Session signed out");
    }

    async fn remove_all(&self, mut remaining: Vec<Account>) {
        while let Some(account) = remaining.first().cloned() {
            if let Err(e) = self.provider.remove_account(&account).await {
                self.events.error(format!(
                    "Could not remove account {}: {}",
                    account.display_name(),
                    e
                ));
                return;
            }

            let next = match self.provider.accounts().await {
                Ok(next) => next,
                Err(e) => {
                    self.events
                        .error(format!("Could not list cached accounts: {}", e));
                    return;
                }
            };

            // A store that does not shrink would loop forever.
            if next.len() >= remaining.len() {
                self.events.error(format!(
                    "Account {} is still cached after removal",
                    account.display_name()
                ));
                return;
            }
            remaining = next;
        }
    }

    /// Record the user's profile. Ignored when signed out.
    pub(crate) fn set_profile(&self, name: Option<String>, email: Option<String>) -> bool {
        self.session.lock().set_profile(name, email)
    }
}

impl<P: IdentityProvider> std::fmt::Debug for IdentityClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("authority", &self.config.authority)
            .field("scopes", &self.scopes)
            .field("session", &*self.session.lock())
            .field("account", &self.account.lock().as_ref().map(|a| a.id.clone()))
            .finish()
    }
}
