//! Microsoft Graph drive client.
//!
//! [`GraphClient`] issues the handful of read requests the session needs:
//! the user's profile, the drive root, folder listings and file contents.
//! Every request is authenticated through a [`RequestAuthenticator`] just
//! before it is sent, so an expired token is renewed between pages.

use bytes::Bytes;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::RequestAuthenticator;
use crate::config::AppConfig;

mod error;
mod types;

pub use error::{ITEM_NOT_FOUND, RemoteError, Result};
pub use types::{RemoteItem, UserProfile};

use types::{ChildrenPage, DriveItemDto};

const FOLDERS_FILTER: &str = "folder ne null";
const FILES_FILTER: &str = "file ne null";

/// Client for the Graph drive endpoints.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    max_pages: usize,
    listing_timeout: Duration,
}

impl GraphClient {
    /// Build a client from configuration.
    ///
    /// The per-request timeout applies to each HTTP call; listings are
    /// additionally bounded by `max_pages` and `listing_timeout_secs`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(config.graph_base_url.trim_end_matches('/')).map_err(|e| {
            RemoteError::InvalidUrl {
                url: config.graph_base_url.clone(),
                message: e.to_string(),
            }
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl {
                url: config.graph_base_url.clone(),
                message: "not a base URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url,
            max_pages: config.max_pages,
            listing_timeout: config.listing_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl {
                url: self.base_url.to_string(),
                message: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments.iter().map(AsRef::as_ref));
        Ok(url)
    }

    async fn send<A>(&self, auth: &A, url: Url) -> Result<reqwest::Response>
    where
        A: RequestAuthenticator + ?Sized,
    {
        let resource = url.path().to_string();
        debug!("GET {}", resource);

        let request = self.http.get(url).header(ACCEPT, "application/json");
        let response = auth.authenticate(request).await?.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = RemoteError::from_response(status.as_u16(), &resource, &body);
        if !error.is_not_found() {
            warn!("Graph request failed: {}", error);
        }
        Err(error)
    }

    async fn get_json<A, T>(&self, auth: &A, url: Url) -> Result<T>
    where
        A: RequestAuthenticator + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.send(auth, url).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn get_bytes<A>(&self, auth: &A, url: Url) -> Result<Bytes>
    where
        A: RequestAuthenticator + ?Sized,
    {
        Ok(self.send(auth, url).await?.bytes().await?)
    }

    /// `GET /me`, decoded strictly.
    #[instrument(skip_all)]
    pub async fn me<A>(&self, auth: &A) -> Result<UserProfile>
    where
        A: RequestAuthenticator + ?Sized,
    {
        self.get_json(auth, self.endpoint(&["me"])?).await
    }

    /// `GET /me` as untyped JSON.
    #[instrument(skip_all)]
    pub async fn me_raw<A>(&self, auth: &A) -> Result<serde_json::Value>
    where
        A: RequestAuthenticator + ?Sized,
    {
        self.get_json(auth, self.endpoint(&["me"])?).await
    }

    /// `GET /me/drive/root`.
    #[instrument(skip_all)]
    pub async fn root<A>(&self, auth: &A) -> Result<RemoteItem>
    where
        A: RequestAuthenticator + ?Sized,
    {
        let item: DriveItemDto = self
            .get_json(auth, self.endpoint(&["me", "drive", "root"])?)
            .await?;
        Ok(item.into())
    }

    /// Every child of `folder_id` that is a folder (`folders_only`) or a
    /// file, following `@odata.nextLink` until the listing is complete.
    #[instrument(skip(self, auth))]
    pub async fn list_children<A>(
        &self,
        auth: &A,
        folder_id: &str,
        folders_only: bool,
    ) -> Result<Vec<RemoteItem>>
    where
        A: RequestAuthenticator + ?Sized,
    {
        let mut url = self.endpoint(&["me", "drive", "items", folder_id, "children"])?;
        url.query_pairs_mut().append_pair(
            "$filter",
            if folders_only { FOLDERS_FILTER } else { FILES_FILTER },
        );

        tokio::time::timeout(self.listing_timeout, self.collect_pages(auth, url))
            .await
            .map_err(|_| RemoteError::Timeout(self.listing_timeout))?
    }

    async fn collect_pages<A>(&self, auth: &A, first: Url) -> Result<Vec<RemoteItem>>
    where
        A: RequestAuthenticator + ?Sized,
    {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == self.max_pages {
                return Err(RemoteError::PageLimit {
                    limit: self.max_pages,
                });
            }
            pages += 1;

            let page: ChildrenPage = self.get_json(auth, url).await?;
            items.extend(page.value.into_iter().map(RemoteItem::from));

            if let Some(link) = page.next_link {
                next = Some(self.continuation(&link)?);
            }
        }

        debug!("Listed {} items in {} pages", items.len(), pages);
        Ok(items)
    }

    /// Parse a continuation link, refusing to send the token elsewhere.
    fn continuation(&self, link: &str) -> Result<Url> {
        let url = Url::parse(link).map_err(|e| RemoteError::InvalidUrl {
            url: link.to_string(),
            message: e.to_string(),
        })?;
        if url.origin() != self.base_url.origin() {
            return Err(RemoteError::InvalidUrl {
                url: link.to_string(),
                message: "continuation link points at a different host".to_string(),
            });
        }
        Ok(url)
    }

    /// Content of the file at `path` below folder `folder_id`
    /// (`GET /me/drive/items/{id}:/{path}:/content`).
    #[instrument(skip(self, auth))]
    pub async fn content_by_path<A>(&self, auth: &A, folder_id: &str, path: &str) -> Result<Bytes>
    where
        A: RequestAuthenticator + ?Sized,
    {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some((last, leading)) = parts.split_last() else {
            return Err(RemoteError::InvalidUrl {
                url: path.to_string(),
                message: "empty file path".to_string(),
            });
        };

        let mut segments = vec![
            "me".to_string(),
            "drive".to_string(),
            "items".to_string(),
            format!("{}:", folder_id),
        ];
        segments.extend(leading.iter().map(|p| p.to_string()));
        segments.push(format!("{}:", last));
        segments.push("content".to_string());

        self.get_bytes(auth, self.endpoint(segments.as_slice())?).await
    }

    /// Content of the item `item_id` (`GET /me/drive/items/{id}/content`).
    #[instrument(skip(self, auth))]
    pub async fn content_by_id<A>(&self, auth: &A, item_id: &str) -> Result<Bytes>
    where
        A: RequestAuthenticator + ?Sized,
    {
        let url = self.endpoint(&["me", "drive", "items", item_id, "content"])?;
        self.get_bytes(auth, url).await
    }
}
