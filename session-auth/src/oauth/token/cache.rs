//! In-memory holder for the session's token set.

use super::TokenSet;

/// Holds at most one token set. Never persisted.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Option<TokenSet>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self { tokens: None }
    }

    /// Replace the held token set.
    pub fn store(&mut self, tokens: TokenSet) {
        self.tokens = Some(tokens);
    }

    /// The held token set, if any.
    pub fn current(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    /// Returns true if `now + skew` has reached the held token's expiry.
    ///
    /// An empty cache has nothing usable and reports expired.
    pub fn is_expired(&self, now_epoch_seconds: i64, skew_seconds: i64) -> bool {
        self.tokens
            .as_ref()
            .map(|tokens| tokens.is_expired(now_epoch_seconds, skew_seconds))
            .unwrap_or(true)
    }

    pub fn clear(&mut self) {
        self.tokens = None;
    }
}
