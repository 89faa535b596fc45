//! OpenID Connect provider over HTTP.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{
    authorization_error, discovery_error, discovery_transport_error, token_transport_error,
    AuthorizationErrorKind, DiscoveryErrorKind, Error,
};
use crate::oauth::token::TokenResponse;
use crate::oauth::{ClientRegistration, ServiceConfiguration};

/// Error body defined by RFC 6749 section 5.2.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Request to exchange authorization code for tokens
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    code_verifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// Request to refresh access token
#[derive(Debug, Serialize)]
struct TokenRefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// OpenID Connect provider.
///
/// Reads endpoints from the issuer's discovery document and talks to the token
/// endpoint with `application/x-www-form-urlencoded` requests.
pub struct Provider {
    discovery_url: Url,
    registration: ClientRegistration,
    http_client: reqwest::Client,
}

impl Provider {
    /// Create a new provider.
    ///
    /// # Arguments
    ///
    /// * `discovery_url` - Full URL of the `.well-known/openid-configuration` document
    /// * `registration` - Client id, optional secret and redirect URI
    /// * `http_client` - Client carrying the network timeout
    pub fn new(
        discovery_url: Url,
        registration: ClientRegistration,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            discovery_url,
            registration,
            http_client,
        }
    }

    fn client_secret(&self) -> Option<&str> {
        self.registration
            .client_secret
            .as_ref()
            .map(|secret| secret.expose_secret().as_str())
    }

    async fn post_token_request<T: Serialize + ?Sized>(
        &self,
        token_endpoint: &Url,
        form: &T,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http_client
            .post(token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                warn!("Token endpoint request failed: {:?}", e);
                token_transport_error(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(token_transport_error)?;

        if status.is_success() {
            let tokens = serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
                warn!("Failed to parse token response: {:?}", e);
                authorization_error(
                    AuthorizationErrorKind::InvalidResponse,
                    &format!("Invalid token response: {}", e),
                )
            })?;
            if tokens.expires_in < 0 {
                warn!("Token endpoint returned negative expires_in {}", tokens.expires_in);
                return Err(authorization_error(
                    AuthorizationErrorKind::InvalidResponse,
                    &format!("Invalid token lifetime: {}", tokens.expires_in),
                ));
            }
            return Ok(tokens);
        }

        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(oauth_error) => {
                warn!("Token endpoint rejected the grant: {}", oauth_error.error);
                let message = match oauth_error.error_description {
                    Some(description) => format!("{}: {}", oauth_error.error, description),
                    None => oauth_error.error,
                };
                Err(authorization_error(
                    AuthorizationErrorKind::TokenRejected,
                    &message,
                ))
            }
            Err(_) => {
                warn!("Token endpoint returned {}", status);
                Err(authorization_error(
                    AuthorizationErrorKind::InvalidResponse,
                    &format!("Token endpoint returned {}", status),
                ))
            }
        }
    }
}

#[async_trait]
impl crate::oauth::Provider for Provider {
    async fn fetch_configuration(&self) -> Result<ServiceConfiguration, Error> {
        debug!("Fetching discovery document from {}", self.discovery_url);

        let response = self
            .http_client
            .get(self.discovery_url.clone())
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to fetch discovery document: {:?}", e);
                discovery_transport_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Discovery endpoint returned {}", status);
            return Err(discovery_error(
                DiscoveryErrorKind::Status(status.as_u16()),
                &format!("Discovery endpoint returned {}", status),
            ));
        }

        let body = response.text().await.map_err(discovery_transport_error)?;
        let configuration = ServiceConfiguration::from_json(&body)?;
        info!("Fetched service configuration from {}", self.discovery_url);
        Ok(configuration)
    }

    async fn exchange_code(
        &self,
        configuration: &ServiceConfiguration,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let request = TokenExchangeRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: self.registration.redirect_uri.as_str(),
            client_id: &self.registration.client_id,
            code_verifier: pkce_verifier,
            client_secret: self.client_secret(),
        };

        debug!("Exchanging authorization code for tokens");
        let tokens = self
            .post_token_request(&configuration.token_endpoint, &request)
            .await?;
        info!("Successfully exchanged authorization code for tokens");
        Ok(tokens)
    }

    async fn refresh_token(
        &self,
        configuration: &ServiceConfiguration,
        refresh_token: &str,
    ) -> Result<TokenResponse, Error> {
        let request = TokenRefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.registration.client_id,
            client_secret: self.client_secret(),
        };

        debug!("Refreshing access token");
        let tokens = self
            .post_token_request(&configuration.token_endpoint, &request)
            .await?;
        info!("Successfully refreshed access token");
        Ok(tokens)
    }
}
