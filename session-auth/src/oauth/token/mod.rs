//! OAuth token types and the in-memory token cache.

mod cache;
mod tokens;

pub use cache::TokenCache;
pub use tokens::{TokenResponse, TokenSet};
