//! Graph API payloads and the domain types decoded from them.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

/// An entry of a drive folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

impl RemoteItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, is_folder: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder,
        }
    }
}

/// Profile of the signed-in user, from `GET /me`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl UserProfile {
    /// `mail` when present and non-empty, else `userPrincipalName`.
    ///
    /// Personal accounts frequently have no `mail`.
    pub fn preferred_email(&self) -> Option<&str> {
        self.mail
            .as_deref()
            .filter(|mail| !mail.is_empty())
            .or(self.user_principal_name.as_deref())
    }

    /// Pick the profile fields out of arbitrary JSON, ignoring anything
    /// that is missing or not a string.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let field = |name: &str| value.get(name).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            display_name: field("displayName"),
            mail: field("mail"),
            user_principal_name: field("userPrincipalName"),
        }
    }
}

/// `driveItem` resource, reduced to what the client reads.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DriveItemDto {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Present (with any content) exactly when the item is a folder.
    #[serde(default)]
    pub folder: Option<IgnoredAny>,
}

impl From<DriveItemDto> for RemoteItem {
    fn from(value: DriveItemDto) -> Self {
        RemoteItem {
            id: value.id,
            name: value.name.unwrap_or_default(),
            is_folder: value.folder.is_some(),
        }
    }
}

/// One page of a children listing.
#[derive(Debug, Deserialize)]
pub(crate) struct ChildrenPage {
    #[serde(default)]
    pub value: Vec<DriveItemDto>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}
