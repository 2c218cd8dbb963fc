//! Cached account metadata.
//!
//! Token material lives in a [`SecretStore`](crate::store::SecretStore);
//! this store keeps the list of signed-in accounts alongside it as JSON,
//! because keyring backends cannot enumerate their entries.
//!
//! # Storage Location
//!
//! `accounts.json` in the platform data directory, e.g.
//! `~/.local/share/driveline/accounts.json` on Linux.

use crate::model::{Account, AccountId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for account store operations.
#[derive(Debug, Error)]
pub enum AccountStoreError {
    /// Account already exists.
    #[error("account {account} already exists")]
    AlreadyExists { account: String },

    /// Account not found.
    #[error("account {account} not found")]
    NotFound { account: String },

    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountStoreData {
    version: u32,
    accounts: Vec<Account>,
}

impl Default for AccountStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            accounts: Vec::new(),
        }
    }
}

/// Account metadata store.
///
/// Accounts keep insertion order, so "the first cached account" is the
/// oldest one still present.
pub struct AccountStore {
    /// Backing file; `None` keeps everything in memory.
    path: Option<PathBuf>,
    data: RwLock<AccountStoreData>,
}

impl AccountStore {
    /// Default location of the accounts file.
    pub fn default_path() -> Result<PathBuf, AccountStoreError> {
        let dirs = directories::ProjectDirs::from("com", "driveline", "driveline")
            .ok_or(AccountStoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join("accounts.json"))
    }

    /// Load the account store from the default location.
    pub fn load() -> Result<Self, AccountStoreError> {
        Self::load_from_path(Self::default_path()?)
    }

    /// Load the account store from a specific path.
    ///
    /// Creates parent directories if they don't exist. A missing file is an
    /// empty store.
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, AccountStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            AccountStoreData::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Create a store that never touches the disk.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            data: RwLock::new(AccountStoreData::default()),
        }
    }

    fn save(&self, data: &AccountStoreData) -> Result<(), AccountStoreError> {
        if let Some(path) = &self.path {
            let contents = serde_json::to_string_pretty(data)?;
            fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Add a new account.
    ///
    /// Returns an error if an account with the same id already exists.
    pub fn add_account(&self, account: Account) -> Result<(), AccountStoreError> {
        let mut data = self.data.write();

        if data.accounts.iter().any(|a| a.id == account.id) {
            return Err(AccountStoreError::AlreadyExists {
                account: account.id.to_string(),
            });
        }

        data.accounts.push(account);
        self.save(&data)
    }

    /// Add an account, or replace the cached account with the same id.
    ///
    /// A replaced account keeps its position and `created_at`. Returns
    /// `true` when an existing entry was replaced.
    pub fn upsert_account(&self, mut account: Account) -> Result<bool, AccountStoreError> {
        let mut data = self.data.write();

        let replaced = match data.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => {
                account.created_at = existing.created_at;
                *existing = account;
                true
            }
            None => {
                data.accounts.push(account);
                false
            }
        };

        self.save(&data)?;
        Ok(replaced)
    }

    /// Get an account by id.
    pub fn get_account(&self, account: &AccountId) -> Option<Account> {
        self.data
            .read()
            .accounts
            .iter()
            .find(|a| &a.id == account)
            .cloned()
    }

    /// List all cached accounts in insertion order.
    pub fn list_accounts(&self) -> Vec<Account> {
        self.data.read().accounts.clone()
    }

    /// Remove an account.
    ///
    /// Returns an error if the account doesn't exist.
    pub fn remove_account(&self, account: &AccountId) -> Result<(), AccountStoreError> {
        let mut data = self.data.write();

        let initial_len = data.accounts.len();
        data.accounts.retain(|a| &a.id != account);

        if data.accounts.len() == initial_len {
            return Err(AccountStoreError::NotFound {
                account: account.to_string(),
            });
        }

        self.save(&data)
    }

    /// Record that a token was just acquired for the account.
    pub fn update_last_used(&self, account: &AccountId) -> Result<(), AccountStoreError> {
        let mut data = self.data.write();

        let entry = data
            .accounts
            .iter_mut()
            .find(|a| &a.id == account)
            .ok_or_else(|| AccountStoreError::NotFound {
                account: account.to_string(),
            })?;

        entry.last_used = Some(chrono::Utc::now());
        self.save(&data)
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("path", &self.path)
            .field("accounts", &self.data.read().accounts.len())
            .finish()
    }
}
