//! Administrator credential check.

use std::fmt;
use subtle::ConstantTimeEq;

/// The only administrator account name.
pub const ADMIN_USER: &str = "admin";

/// Verifies administrator credentials.
///
/// An empty configured password disables administrator access.
#[derive(Clone)]
pub struct AdminGate {
    password: String,
}

impl AdminGate {
    /// Creates a gate accepting `admin` with `password`.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    /// Returns true if the credentials are the administrator's.
    #[must_use]
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(user.as_bytes(), ADMIN_USER.as_bytes());
        let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        !self.password.is_empty() && user_ok & password_ok
    }

    /// Returns true if a password is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminGate")
            .field("password", &"<redacted>")
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
