//! Error types for the Graph drive client.

use std::time::Duration;
use thiserror::Error;

use crate::identity::IdentityError;

/// Graph error code for a missing drive item.
pub const ITEM_NOT_FOUND: &str = "itemNotFound";

/// Remote document API errors.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The requested item does not exist (HTTP 404 or `itemNotFound`).
    #[error("Item not found: {resource}")]
    NotFound { resource: String },

    /// Transport failure, including the per-request timeout.
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an unexpected status.
    #[error("Graph API error (status {status}): {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Failed to parse API response: {0}")]
    Decode(String),

    /// No bearer token could be obtained for the request.
    #[error("Authentication failed: {0}")]
    Identity(#[from] IdentityError),

    /// The request authenticator could not be built.
    #[error("Graph client is not initialized: {message}")]
    NotInitialized { message: String },

    /// A listing followed more continuation links than allowed.
    #[error("Listing exceeded {limit} pages")]
    PageLimit { limit: usize },

    /// A listing did not finish before its deadline.
    #[error("Listing did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Result type for Graph operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify a non-success response.
    ///
    /// `body` is the raw error payload; Graph wraps it as
    /// `{"error": {"code": ..., "message": ...}}`.
    pub fn from_response(status: u16, resource: &str, body: &str) -> Self {
        let detail = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error);

        let code = detail.as_ref().and_then(|d| d.code.clone());
        if status == 404 || code.as_deref() == Some(ITEM_NOT_FOUND) {
            return Self::NotFound {
                resource: resource.to_string(),
            };
        }

        let message = detail
            .and_then(|d| d.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        Self::Status {
            status,
            code,
            message,
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(serde::Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_is_not_found() {
        let error = RemoteError::from_response(404, "items/abc", "");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_item_not_found_code_is_not_found() {
        let body = r#"{"error":{"code":"itemNotFound","message":"The resource could not be found."}}"#;
        let error = RemoteError::from_response(400, "items/abc", body);
        assert!(error.is_not_found());
    }

    #[test]
    fn test_other_status_keeps_graph_message() {
        let body = r#"{"error":{"code":"accessDenied","message":"Access denied"}}"#;
        let error = RemoteError::from_response(403, "me", body);

        match &error {
            RemoteError::Status { status, code, .. } => {
                assert_eq!(*status, 403);
                assert_eq!(code.as_deref(), Some("accessDenied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(error.to_string(), "Graph API error (status 403): Access denied");
    }

    #[test]
    fn test_non_json_body_is_used_verbatim() {
        let error = RemoteError::from_response(502, "me", "Bad Gateway\n");
        assert_eq!(error.to_string(), "Graph API error (status 502): Bad Gateway");
    }
}
