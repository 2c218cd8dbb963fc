//! Identity claims carried by the token endpoint's `id_token`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::identity::IdentityError;
use crate::model::AccountId;

/// The claims Driveline reads from an `id_token`.
///
/// The signature is not checked. Only decode tokens received directly
/// from the token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
    /// Object id of the user in the issuing tenant.
    #[serde(default)]
    pub oid: Option<String>,

    /// Tenant id.
    #[serde(default)]
    pub tid: Option<String>,

    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a compact JWT.
    pub fn decode(id_token: &str) -> Result<Self, IdentityError> {
        let payload = id_token
            .split('.')
            .nth(1)
            .ok_or_else(|| IdentityError::authentication("id_token is not a JWT"))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| IdentityError::authentication(format!("id_token payload: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| IdentityError::authentication(format!("id_token claims: {}", e)))
    }

    /// Stable key for the user: `{oid}.{tid}`, else `oid`, else `sub`.
    pub fn account_id(&self) -> Option<AccountId> {
        let oid = non_empty(&self.oid);
        match (oid, non_empty(&self.tid)) {
            (Some(oid), Some(tid)) => Some(AccountId::new(format!("{}.{}", oid, tid))),
            (Some(oid), None) => Some(AccountId::new(oid)),
            (None, _) => non_empty(&self.sub).map(AccountId::new),
        }
    }

    /// Sign-in name, falling back to the display name.
    pub fn username(&self) -> Option<&str> {
        non_empty(&self.preferred_username).or_else(|| non_empty(&self.name))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
