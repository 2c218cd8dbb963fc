//! Signed-in state of the current user.

use serde::{Deserialize, Serialize};

/// Who is signed in, if anyone.
///
/// `user_name` and `user_email` are only ever `Some` while `signed_in` is
/// true: the only way to leave the signed-in state is [`Session::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    signed_in: bool,
    user_name: Option<String>,
    user_email: Option<String>,
}

impl Session {
    /// A signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    /// Enter the signed-in state. Profile fields are kept if already set.
    pub(crate) fn mark_signed_in(&mut self) {
        self.signed_in = true;
    }

    /// Record the profile of the signed-in user. Ignored when signed out.
    pub(crate) fn set_profile(&mut self, name: Option<String>, email: Option<String>) -> bool {
        if !self.signed_in {
            return false;
        }
        self.user_name = name;
        self.user_email = email;
        true
    }

    /// Return to the signed-out state, clearing the profile.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
