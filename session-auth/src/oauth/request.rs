//! Authorization request construction and callback parsing.

use std::collections::HashMap;

use secrecy::SecretString;
use url::Url;

use super::pkce::{PkceVerifier, CHALLENGE_METHOD};
use super::state::CsrfState;
use crate::error::{authorization_error, AuthorizationErrorKind, Error};

/// The application's registration with the provider.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    /// Only confidential clients have one; the desktop shell usually does not.
    pub client_secret: Option<SecretString>,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    /// Extra query parameters appended to every authorization request.
    pub extras: Vec<(String, String)>,
}

impl ClientRegistration {
    pub fn new(client_id: impl Into<String>, redirect_uri: Url, scopes: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
            scopes,
            extras: vec![
                ("prompt".to_string(), "consent".to_string()),
                ("access_type".to_string(), "offline".to_string()),
            ],
        }
    }

    pub fn with_client_secret(mut self, secret: SecretString) -> Self {
        self.client_secret = Some(secret);
        self
    }
}

/// A single authorization attempt: the URL to present plus the values needed
/// to validate the callback and redeem the code.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Authorization URL to send the user to.
    pub url: Url,
    /// CSRF state parameter for validation.
    pub state: CsrfState,
    /// PKCE verifier to be sent with the code exchange.
    pub pkce_verifier: PkceVerifier,
    /// Where the provider will send the user back to.
    pub redirect_uri: Url,
}

impl AuthorizationRequest {
    /// Build a request with a fresh state and PKCE verifier.
    pub fn new(
        authorization_endpoint: &Url,
        registration: &ClientRegistration,
        login_hint: Option<&str>,
    ) -> Self {
        let state = CsrfState::generate();
        let pkce_verifier = PkceVerifier::generate();
        let challenge = pkce_verifier.challenge();

        let mut url = authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &registration.client_id)
                .append_pair("redirect_uri", registration.redirect_uri.as_str())
                .append_pair("scope", &registration.scopes.join(" "))
                .append_pair("state", state.as_str())
                .append_pair("code_challenge", challenge.as_str())
                .append_pair("code_challenge_method", CHALLENGE_METHOD);
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", hint);
            }
            for (key, value) in &registration.extras {
                query.append_pair(key, value);
            }
        }

        Self {
            url,
            state,
            pkce_verifier,
            redirect_uri: registration.redirect_uri.clone(),
        }
    }
}

/// Parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizationResponse {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthorizationResponse {
    /// Read the callback parameters from the redirect URL's query string.
    pub fn from_redirect(url: &Url) -> Self {
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        Self {
            code: params.get("code").cloned(),
            state: params.get("state").cloned(),
            error: params.get("error").cloned(),
            error_description: params.get("error_description").cloned(),
        }
    }

    /// True if this callback carries either a code or an error.
    pub fn is_complete(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }

    /// Validate the callback against the pending request and extract the code.
    pub fn into_code(self, expected: &CsrfState) -> Result<String, Error> {
        if let Some(error) = self.error {
            let message = match self.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Err(authorization_error(AuthorizationErrorKind::AccessDenied, &message));
        }

        match self.state.as_deref() {
            Some(state) if expected.matches(state) => {}
            _ => {
                return Err(authorization_error(
                    AuthorizationErrorKind::InvalidState,
                    "State parameter does not match the pending request",
                ))
            }
        }

        self.code.ok_or_else(|| {
            authorization_error(
                AuthorizationErrorKind::MissingCode,
                "Callback carried neither a code nor an error",
            )
        })
    }
}
