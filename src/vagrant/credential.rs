//! Throw-away password for one packaging run.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

pub const PASSWORD_LENGTH: usize = 20;

/// A random password that lives only as long as the run.
///
/// `Debug` and `Display` never reveal the value; use [`Credential::expose`]
/// at the exact place it is handed to a child process.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Generate 20 random alphanumeric characters.
    pub fn generate() -> Self {
        let password = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect();
        Self(password)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
