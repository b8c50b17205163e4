//! Credentials for authenticating with the service.

use std::fmt;

/// A username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassPair {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for UserPassPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPassPair")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Credentials used for every request made by a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    user_pass: UserPassPair,
}

impl Credential {
    /// Authenticate with a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_pass: UserPassPair {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// The username and password.
    #[must_use]
    pub fn user_pass(&self) -> &UserPassPair {
        &self.user_pass
    }
}
