//! OAuth provider and authorization UI traits.

use async_trait::async_trait;

use super::discovery::ServiceConfiguration;
use super::request::{AuthorizationRequest, AuthorizationResponse};
use super::token::TokenResponse;
use crate::error::Error;

/// Trait for the provider's network endpoints.
///
/// Implementations handle:
/// - Fetching the discovery document
/// - Authorization code exchange
/// - Token refresh
///
/// None of these calls are retried by the caller; each failure is surfaced once.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Fetch and parse the discovery document.
    ///
    /// Fails with a `Discovery` error if the document is unreachable or malformed.
    async fn fetch_configuration(&self) -> Result<ServiceConfiguration, Error>;

    /// Exchange an authorization code for tokens.
    ///
    /// # Arguments
    ///
    /// * `configuration` - Cached discovery metadata
    /// * `code` - Authorization code from the redirect callback
    /// * `pkce_verifier` - PKCE code verifier of the pending request
    async fn exchange_code(
        &self,
        configuration: &ServiceConfiguration,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenResponse, Error>;

    /// Obtain a new access token using a refresh token.
    async fn refresh_token(
        &self,
        configuration: &ServiceConfiguration,
        refresh_token: &str,
    ) -> Result<TokenResponse, Error>;
}

/// Presents an authorization request to the user and waits for the redirect.
///
/// There is no timeout: the interactive step is bounded by the provider's UI.
#[async_trait]
pub trait AuthorizationUi: Send + Sync {
    async fn present(&self, request: &AuthorizationRequest) -> Result<AuthorizationResponse, Error>;
}
