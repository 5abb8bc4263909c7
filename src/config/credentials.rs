//! PetKit account credentials

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account e-mail and password used to open a PetKit session
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PetkitCredentials {
    /// Account e-mail (vendor calls it "username")
    #[serde(default)]
    pub email: String,
    /// Plain-text password; hashed before it leaves the process
    #[serde(default)]
    pub password: String,
}

impl PetkitCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Both fields present
    pub fn is_complete(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }

    /// Lowercase hex MD5 digest of the password, as the login endpoint expects
    pub fn password_digest(&self) -> String {
        format!("{:x}", md5::compute(self.password.as_bytes()))
    }
}

impl fmt::Debug for PetkitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetkitCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
