//! The controller tying sign-in, authentication and the Graph client
//! together.
//!
//! Every [`DriveSession`] operation reports progress through the
//! [`EventSink`] and returns `bool` or `Option`: failures become a
//! message, not an error value. Missing items are not failures. A missing
//! folder lists as empty, a missing file is `None`, and a missing drive
//! root makes [`DriveSession::describe_tree`] a successful no-op.

use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use crate::auth::{AuthenticatorSlot, BearerAuthenticator};
use crate::config::AppConfig;
use crate::events::EventSink;
use crate::identity::{IdentityClient, IdentityProvider};
use crate::remote::{GraphClient, RemoteError, RemoteItem, UserProfile};
use crate::session::Session;

/// Name of the file [`DriveSession::describe_tree`] prints, compared
/// ignoring ASCII case.
pub const README_NAME: &str = "readme.txt";

/// Prefix of every line of readme content emitted by
/// [`DriveSession::describe_tree`].
pub const CONTENT_LINE_PREFIX: &str = ">>> ";

type Authenticator<P> = BearerAuthenticator<Arc<P>>;

/// One user's session against the drive.
pub struct DriveSession<P: IdentityProvider> {
    identity: IdentityClient<Arc<P>>,
    provider: Arc<P>,
    authenticator: AuthenticatorSlot<Arc<P>>,
    graph: GraphClient,
    events: EventSink,
}

impl<P: IdentityProvider + 'static> DriveSession<P> {
    /// Create a signed-out session.
    ///
    /// An unusable application id is reported on `events` right away;
    /// sign-in will refuse to run until the configuration is fixed.
    pub fn new(config: AppConfig, provider: P, events: EventSink) -> Result<Self, RemoteError> {
        if config.validate_application_id().is_err() {
            events.error(
                "The Client ID has not been set in the program, set application_id \
                 to an Azure Application (client) ID",
            );
        }

        let graph = GraphClient::new(&config)?;
        let provider = Arc::new(provider);
        let identity = IdentityClient::new(Arc::clone(&provider), config, events.clone());

        Ok(Self {
            identity,
            provider,
            authenticator: AuthenticatorSlot::new(),
            graph,
            events,
        })
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn identity(&self) -> &IdentityClient<Arc<P>> {
        &self.identity
    }

    pub fn graph(&self) -> &GraphClient {
        &self.graph
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> Session {
        self.identity.session()
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_signed_in()
    }

    /// See [`IdentityClient::sign_in`].
    ///
    /// A Graph authenticator bound to any other account than the one
    /// signed in with is dropped in the same transition.
    pub async fn sign_in(&self, silent_only: bool) -> bool {
        let _op = self.identity.begin_transition().await;
        if !self.identity.sign_in_locked(silent_only).await {
            return false;
        }

        let signed_in = self.identity.account().map(|a| a.id);
        let bound = self.authenticator.bound_account().await.map(|a| a.id);
        if bound.is_some() && bound != signed_in {
            debug!("Dropping Graph authenticator bound to another account");
            self.authenticator.reset().await;
        }
        true
    }

    /// Remove every cached account and drop the Graph authenticator.
    pub async fn sign_out(&self) {
        let _op = self.identity.begin_transition().await;
        self.identity.sign_out_locked().await;
        self.authenticator.reset().await;
    }

    async fn initialize_graph(&self) -> Option<Arc<Authenticator<P>>> {
        let was_ready = self.authenticator.is_ready().await;
        match self
            .authenticator
            .ensure_ready(
                &self.provider,
                self.identity.scopes(),
                self.identity.account().as_ref(),
            )
            .await
        {
            Ok(authenticator) => {
                if was_ready {
                    self.events.info("Microsoft Graph already initialized");
                } else {
                    self.events
                        .info("Microsoft Graph initialization completed without error");
                }
                Some(authenticator)
            }
            Err(e) => {
                self.events.error(format!(
                    "Microsoft Graph initialization failed. Exception message: {}",
                    e
                ));
                None
            }
        }
    }

    /// Fetch the user's profile into the session.
    ///
    /// A profile that fails strict decoding is re-read leniently. On
    /// failure the session keeps its previous values.
    pub async fn get_user_info(&self) -> bool {
        if !self.is_signed_in() {
            self.events
                .warn("Cannot request user information, not signed in");
            return false;
        }
        let Some(auth) = self.initialize_graph().await else {
            return false;
        };

        let profile = match self.graph.me(&*auth).await {
            Ok(profile) => profile,
            Err(e) => {
                self.events.warn(format!(
                    "Microsoft Graph simple query for user information failed. Exception message: {}",
                    e
                ));
                match self.graph.me_raw(&*auth).await {
                    Ok(value) => UserProfile::from_value(&value),
                    Err(e) => {
                        self.events.error(format!(
                            "Microsoft Graph query for user information failed. Exception message: {}",
                            e
                        ));
                        return false;
                    }
                }
            }
        };

        let email = profile.preferred_email().map(str::to_string);
        if !self.identity.set_profile(profile.display_name, email) {
            self.events
                .warn("Signed out while user information was being requested");
            return false;
        }
        true
    }

    /// Children of `folder_id`: folders when `folders_only`, else files.
    ///
    /// A missing folder yields an empty list; other failures yield `None`.
    pub async fn list_children(&self, folder_id: &str, folders_only: bool) -> Option<Vec<RemoteItem>> {
        let auth = self.initialize_graph().await?;
        match self
            .graph
            .list_children(&*auth, folder_id, folders_only)
            .await
        {
            Ok(items) => Some(items),
            Err(e) if e.is_not_found() => {
                debug!("Folder {} not found, listing it as empty", folder_id);
                Some(Vec::new())
            }
            Err(e) => {
                self.events.error(format!(
                    "Microsoft Graph folder listing failed. Exception message: {}",
                    e
                ));
                None
            }
        }
    }

    /// Content of `file_name` (a path relative to `folder_id`).
    ///
    /// An empty `folder_id` returns `None` without any request.
    pub async fn get_file_content(&self, folder_id: &str, file_name: &str) -> Option<Bytes> {
        if folder_id.is_empty() {
            return None;
        }
        let auth = self.initialize_graph().await?;
        match self
            .graph
            .content_by_path(&*auth, folder_id, file_name)
            .await
        {
            Ok(content) => Some(content),
            Err(e) if e.is_not_found() => {
                debug!("{} not found in folder {}", file_name, folder_id);
                None
            }
            Err(e) => {
                self.events.error(format!(
                    "Microsoft Graph file request failed. Exception message: {}",
                    e
                ));
                None
            }
        }
    }

    /// Walk the drive root: list its folders and files, and print
    /// `readme.txt` when there is one.
    pub async fn describe_tree(&self) -> bool {
        let Some(auth) = self.initialize_graph().await else {
            return false;
        };

        match self.walk_tree(&*auth).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!("Drive root not found, nothing to describe");
                true
            }
            Err(e) => {
                self.events.error(format!(
                    "Microsoft Graph folder/file query failed. Exception message: {}",
                    e
                ));
                false
            }
        }
    }

    async fn walk_tree(&self, auth: &Authenticator<P>) -> Result<(), RemoteError> {
        let root = self.graph.root(auth).await?;
        self.events
            .info("Found the base folder item now search for folders, then files, within it");

        let folders = self.children_or_empty(auth, &root.id, true).await?;
        self.events
            .info(format!("Searched for folders, {} found", folders.len()));
        for folder in &folders {
            self.events.info(format!("   {}", folder.name));
        }

        let files = self.children_or_empty(auth, &root.id, false).await?;
        self.events
            .info(format!("Searched for files, {} found", files.len()));
        let mut readme = None;
        for file in &files {
            self.events.info(format!("   {}", file.name));
            if readme.is_none() && file.name.eq_ignore_ascii_case(README_NAME) {
                readme = Some(file);
            }
        }

        let content = match readme {
            Some(item) => match self.graph.content_by_id(auth, &item.id).await {
                Ok(content) => Some(content),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        match content {
            Some(content) => {
                self.events.info("readme.txt file contents:");
                for line in String::from_utf8_lossy(&content).lines() {
                    self.events
                        .info(format!("{}{}", CONTENT_LINE_PREFIX, line));
                }
            }
            None => {
                self.events
                    .info("readme.txt file was not found so will not be listed");
            }
        }
        Ok(())
    }

    async fn children_or_empty(
        &self,
        auth: &Authenticator<P>,
        folder_id: &str,
        folders_only: bool,
    ) -> Result<Vec<RemoteItem>, RemoteError> {
        match self.graph.list_children(auth, folder_id, folders_only).await {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }
}

impl<P: IdentityProvider> std::fmt::Debug for DriveSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveSession")
            .field("identity", &self.identity)
            .field("graph", &self.graph.base_url().as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AuthResult, IdentityError};
    use crate::model::{Account, AccountId};
    use crate::token::Token;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct OneAccount {
        accounts: Mutex<Vec<Account>>,
    }

    impl OneAccount {
        fn new() -> Self {
            let account = Account::new(AccountId::new("acct-1"), "https://authority/", vec![]);
            Self {
                accounts: Mutex::new(vec![account]),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for OneAccount {
        async fn accounts(&self) -> Result<Vec<Account>, IdentityError> {
            Ok(self.accounts.lock().clone())
        }

        async fn acquire_token_silent(
            &self,
            _scopes: &[String],
            account: Option<&Account>,
        ) -> Result<AuthResult, IdentityError> {
            let account = account
                .cloned()
                .ok_or_else(|| IdentityError::interaction_required("no account"))?;
            Ok(AuthResult {
                account,
                token: Token::new("t"),
            })
        }

        async fn acquire_token_interactive(
            &self,
            _scopes: &[String],
        ) -> Result<AuthResult, IdentityError> {
            Err(IdentityError::authentication("not supported"))
        }

        async fn remove_account(&self, account: &Account) -> Result<(), IdentityError> {
            self.accounts.lock().retain(|a| a.id != account.id);
            Ok(())
        }
    }

    fn session() -> DriveSession<OneAccount> {
        let config = AppConfig {
            application_id: "4a1aa1d5-c567-49d0-ad0b-cd957a47f842".to_string(),
            ..AppConfig::default()
        };
        DriveSession::new(config, OneAccount::new(), EventSink::default()).unwrap()
    }

    #[tokio::test]
    async fn test_sign_out_resets_authenticator_inside_the_transition() {
        let session = Arc::new(session());
        assert!(session.sign_in(true).await);
        assert!(session.initialize_graph().await.is_some());

        let transition = session.identity.begin_transition().await;
        let signing_out = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.sign_out().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Nothing moves while another transition holds the lock.
        assert!(session.is_signed_in());
        assert!(session.authenticator.is_ready().await);

        drop(transition);
        signing_out.await.unwrap();
        assert!(!session.is_signed_in());
        assert!(session.identity.account().is_none());
        assert!(!session.authenticator.is_ready().await);
    }

    #[tokio::test]
    async fn test_sign_in_records_the_bound_account() {
        let session = session();
        assert!(session.sign_in(true).await);

        let auth = session.initialize_graph().await.unwrap();
        assert_eq!(auth.account().id.as_str(), "acct-1");
        assert_eq!(
            session.authenticator.bound_account().await.unwrap().id,
            session.identity.account().unwrap().id
        );
    }
}
