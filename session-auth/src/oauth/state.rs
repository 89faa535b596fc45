//! CSRF state parameter for the authorization redirect.

use rand::Rng;

/// Random value sent as `state` and expected back unchanged on the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfState(String);

impl CsrfState {
    /// Generate a cryptographically random state token (32 bytes, hex encoded).
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(random_bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against the value returned by the provider without short-circuiting.
    pub fn matches(&self, returned: &str) -> bool {
        let expected = self.0.as_bytes();
        let returned = returned.as_bytes();
        if expected.len() != returned.len() {
            return false;
        }
        expected
            .iter()
            .zip(returned)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
