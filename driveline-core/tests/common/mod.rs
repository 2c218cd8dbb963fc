//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use driveline_core::{
    Account, AccountId, AppConfig, AuthResult, DriveSession, Event, EventSink, EventStream,
    IdentityError, IdentityProvider, Token,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const APPLICATION_ID: &str = "4a1aa1d5-c567-49d0-ad0b-cd957a47f842";
pub const ACCESS_TOKEN: &str = "token-123";
/// Token served for accounts added by interactive sign-in.
pub const INTERACTIVE_TOKEN: &str = "token-interactive";

/// What silent acquisition answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Silent {
    Token,
    InteractionRequired,
    Fail,
}

/// What interactive acquisition answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactive {
    Succeed,
    Fail,
}

/// In-test identity provider with scripted outcomes and call counters.
pub struct ScriptedProvider {
    accounts: Mutex<Vec<Account>>,
    stale: Mutex<HashSet<AccountId>>,
    tokens: Mutex<HashMap<AccountId, String>>,
    silent: Mutex<Silent>,
    interactive: Mutex<Interactive>,
    pub account_calls: AtomicUsize,
    pub silent_calls: AtomicUsize,
    pub interactive_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(silent: Silent, interactive: Interactive) -> Self {
        Self {
            accounts: Mutex::new(Vec::new()),
            stale: Mutex::new(HashSet::new()),
            tokens: Mutex::new(HashMap::new()),
            silent: Mutex::new(silent),
            interactive: Mutex::new(interactive),
            account_calls: AtomicUsize::new(0),
            silent_calls: AtomicUsize::new(0),
            interactive_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// A provider with one cached account that signs in silently.
    pub fn signed_in_before() -> Self {
        let provider = Self::new(Silent::Token, Interactive::Fail);
        provider.add_account("cached@example.com");
        provider
    }

    pub fn add_account(&self, username: &str) -> Account {
        let account = Account::new(
            AccountId::generate(),
            "https://login.microsoftonline.com/consumers/",
            vec![],
        )
        .with_username(username);
        self.accounts.lock().push(account.clone());
        account
    }

    /// Cache an account whose silent acquisition always needs interaction.
    pub fn add_stale_account(&self, username: &str) -> Account {
        let account = self.add_account(username);
        self.stale.lock().insert(account.id.clone());
        account
    }

    pub fn cached_accounts(&self) -> Vec<Account> {
        self.accounts.lock().clone()
    }

    pub fn set_silent(&self, silent: Silent) {
        *self.silent.lock() = silent;
    }

    pub fn set_interactive(&self, interactive: Interactive) {
        *self.interactive.lock() = interactive;
    }

    pub fn cached(&self) -> usize {
        self.accounts.lock().len()
    }

    /// Total number of calls into the provider.
    pub fn calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
            + self.silent_calls.load(Ordering::SeqCst)
            + self.interactive_calls.load(Ordering::SeqCst)
            + self.remove_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn accounts(&self) -> Result<Vec<Account>, IdentityError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().clone())
    }

    async fn acquire_token_silent(
        &self,
        _scopes: &[String],
        account: Option<&Account>,
    ) -> Result<AuthResult, IdentityError> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(account) = account {
            if self.stale.lock().contains(&account.id) {
                return Err(IdentityError::interaction_required(format!(
                    "The access token for {} expired and no refresh token is cached",
                    account.display_name()
                )));
            }
        }
        match (*self.silent.lock(), account) {
            (Silent::Token, Some(account)) => {
                let token = self
                    .tokens
                    .lock()
                    .get(&account.id)
                    .cloned()
                    .unwrap_or_else(|| ACCESS_TOKEN.to_string());
                Ok(AuthResult {
                    account: account.clone(),
                    token: Token::new(token),
                })
            }
            (Silent::Token, None) | (Silent::InteractionRequired, _) => Err(
                IdentityError::interaction_required("No account or login hint was passed"),
            ),
            (Silent::Fail, _) => Err(IdentityError::authentication("token endpoint unreachable")),
        }
    }

    async fn acquire_token_interactive(
        &self,
        _scopes: &[String],
    ) -> Result<AuthResult, IdentityError> {
        self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        match *self.interactive.lock() {
            Interactive::Succeed => {
                let account = self.add_account("new@example.com");
                self.tokens
                    .lock()
                    .insert(account.id.clone(), INTERACTIVE_TOKEN.to_string());
                Ok(AuthResult {
                    account,
                    token: Token::new(INTERACTIVE_TOKEN),
                })
            }
            Interactive::Fail => Err(IdentityError::authentication("User canceled authentication")),
        }
    }

    async fn remove_account(&self, account: &Account) -> Result<(), IdentityError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.accounts.lock().retain(|a| a.id != account.id);
        Ok(())
    }
}

pub fn config() -> AppConfig {
    AppConfig {
        application_id: APPLICATION_ID.to_string(),
        ..AppConfig::default()
    }
}

pub fn config_for_graph(base_url: &str) -> AppConfig {
    AppConfig {
        graph_base_url: format!("{}/v1.0", base_url),
        ..config()
    }
}

/// A session over `provider` plus a subscription to its events.
pub fn session(
    config: AppConfig,
    provider: ScriptedProvider,
) -> (DriveSession<ScriptedProvider>, EventStream) {
    let events = EventSink::default();
    let stream = events.subscribe();
    let session = DriveSession::new(config, provider, events).unwrap();
    (session, stream)
}

pub fn messages(stream: &mut EventStream) -> Vec<String> {
    stream.drain().into_iter().map(|e: Event| e.message).collect()
}
