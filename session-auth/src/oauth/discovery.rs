//! OpenID Connect discovery metadata.

use serde::Deserialize;
use url::Url;

use crate::error::{discovery_error, DiscoveryErrorKind, Error};

/// Endpoints advertised by the provider's discovery document.
///
/// Only the two endpoints the authorization-code flow needs are read; other
/// metadata in the document is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfiguration {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
}

impl ServiceConfiguration {
    /// Parse a discovery document body.
    ///
    /// Missing endpoints or values that are not absolute URLs are a malformed document.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        serde_json::from_str(body).map_err(|e| {
            discovery_error(
                DiscoveryErrorKind::InvalidDocument,
                &format!("Malformed discovery document: {}", e),
            )
        })
    }
}
