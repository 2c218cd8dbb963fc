//! Application configuration.
//!
//! Configuration is read once at startup from `config.toml` in the
//! platform config directory (or an explicit path). Every field has a
//! default, so the file is optional; only `application_id` has to be set
//! for sign-in to work, and `DRIVELINE_APPLICATION_ID` overrides it.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`AppConfig::application_id`].
pub const APPLICATION_ID_ENV: &str = "DRIVELINE_APPLICATION_ID";

/// Scopes added to every request on top of the configured ones.
pub const IDENTITY_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Placeholder shipped in the default configuration.
pub const UNSET_APPLICATION_ID: &str = "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx";

/// Personal Microsoft accounts only.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/consumers/";

/// Microsoft Graph v1.0 endpoint.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The application (client) id is missing or not a GUID.
    #[error("the Client ID has not been set: '{value}' is not an application (client) ID")]
    InvalidApplicationId { value: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Static application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Application (client) id registered with the identity provider.
    pub application_id: String,

    /// OAuth authority base URL, ending in `/`.
    pub authority: String,

    /// Scopes requested for every token.
    pub scopes: Vec<String>,

    /// Redirect URI; derived from the application id when unset.
    pub redirect_uri: Option<String>,

    /// Optional user name hint passed to the interactive flow.
    pub login_hint: Option<String>,

    /// Base URL of the remote document API.
    pub graph_base_url: String,

    /// Overall timeout for a single remote request.
    pub request_timeout_secs: u64,

    /// Deadline for a complete paginated listing.
    pub listing_timeout_secs: u64,

    /// Maximum number of pages followed by one listing.
    pub max_pages: usize,

    /// Tokens expiring within this window are refreshed early.
    pub expiry_buffer_minutes: i64,

    /// Port used by the loopback redirect listener.
    pub loopback_port: u16,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Keep tokens in the OS keyring when available.
    pub prefer_keyring: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application_id: UNSET_APPLICATION_ID.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            scopes: vec![
                "User.Read".to_string(),
                "MailboxSettings.Read".to_string(),
                "Files.ReadWrite.All".to_string(),
            ],
            redirect_uri: None,
            login_hint: None,
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            request_timeout_secs: 10,
            listing_timeout_secs: 120,
            max_pages: 1000,
            expiry_buffer_minutes: 5,
            loopback_port: 8400,
            log_level: "info".to_string(),
            prefer_keyring: true,
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("driveline.toml"))
    }

    /// Load from the default location, applying environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path` (defaults if the file does not exist), applying
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Self::default()
        };

        if let Ok(id) = std::env::var(APPLICATION_ID_ENV) {
            config.application_id = id;
        }

        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Check the application id alone.
    pub fn validate_application_id(&self) -> Result<(), ConfigError> {
        uuid::Uuid::parse_str(self.application_id.trim())
            .map(|_| ())
            .map_err(|_| ConfigError::InvalidApplicationId {
                value: self.application_id.clone(),
            })
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_application_id()?;

        if self.scopes.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one scope is required".to_string(),
            });
        }
        if self.request_timeout_secs == 0 || self.listing_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "timeouts must be greater than zero".to_string(),
            });
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid {
                message: "max_pages must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Redirect URI registered for the application.
    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("msal{}://auth", self.application_id))
    }

    /// Authorization endpoint under the authority.
    pub fn authorize_url(&self) -> String {
        format!("{}oauth2/v2.0/authorize", self.authority_base())
    }

    /// Token endpoint under the authority.
    pub fn token_url(&self) -> String {
        format!("{}oauth2/v2.0/token", self.authority_base())
    }

    fn authority_base(&self) -> String {
        if self.authority.ends_with('/') {
            self.authority.clone()
        } else {
            format!("{}/", self.authority)
        }
    }

    /// Scopes sent to the token endpoint: the configured set plus
    /// `openid profile` for the `id_token` and `offline_access` for a
    /// refresh token.
    pub fn requested_scopes(&self) -> Vec<String> {
        let mut scopes = self.scopes.clone();
        for extra in IDENTITY_SCOPES {
            if !scopes.iter().any(|s| s == extra) {
                scopes.push(extra.to_string());
            }
        }
        scopes
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn expiry_buffer(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.expiry_buffer_minutes)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "driveline", "driveline")
}
