//! OAuth token types.

use secrecy::SecretString;
use serde::Deserialize;

/// Token set held for the signed-in session.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Access token for API requests.
    pub access_token: SecretString,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: Option<SecretString>,
    /// OpenID Connect id token, if the grant returned one.
    pub id_token: Option<SecretString>,
    /// When the access token expires, in seconds since the Unix epoch.
    pub expires_at_epoch_seconds: i64,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `now`.
    pub fn from_response(response: TokenResponse, now_epoch_seconds: i64) -> Self {
        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token: response.refresh_token.map(SecretString::from),
            id_token: response.id_token.map(SecretString::from),
            expires_at_epoch_seconds: now_epoch_seconds.saturating_add(response.expires_in),
        }
    }

    /// Build the token set that replaces `self` after a refresh.
    ///
    /// Providers that do not rotate refresh tokens omit them from the refresh
    /// response, so the previous refresh token and id token are carried over.
    pub fn refreshed(&self, response: TokenResponse, now_epoch_seconds: i64) -> Self {
        let mut next = Self::from_response(response, now_epoch_seconds);
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
        }
        if next.id_token.is_none() {
            next.id_token = self.id_token.clone();
        }
        next
    }

    /// Returns true once `now + skew` reaches the expiry instant.
    pub fn is_expired(&self, now_epoch_seconds: i64, skew_seconds: i64) -> bool {
        now_epoch_seconds.saturating_add(skew_seconds) >= self.expires_at_epoch_seconds
    }
}

/// JSON body returned by the token endpoint for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            expires_in: 3600,
            refresh_token: refresh.map(str::to_string),
            id_token: None,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    #[test]
    fn test_expiry_is_relative_to_receipt() {
        let tokens = TokenSet::from_response(response("A", Some("R")), 1_000);
        assert_eq!(tokens.expires_at_epoch_seconds, 4_600);
    }

    #[test]
    fn test_token_not_expired() {
        let tokens = TokenSet::from_response(response("A", None), 1_000);
        assert!(!tokens.is_expired(1_000, 60));
    }

    #[test]
    fn test_token_expiring_within_skew() {
        let tokens = TokenSet::from_response(response("A", None), 1_000);
        assert!(tokens.is_expired(4_540, 60));
        assert!(!tokens.is_expired(4_539, 60));
    }

    #[test]
    fn test_huge_lifetime_saturates() {
        let mut huge = response("A", None);
        huge.expires_in = i64::MAX;
        let tokens = TokenSet::from_response(huge, 1_000);

        assert_eq!(tokens.expires_at_epoch_seconds, i64::MAX);
        assert!(!tokens.is_expired(1_000, 60));
        assert!(tokens.is_expired(i64::MAX, 60));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let tokens = TokenSet::from_response(response("A", Some("R")), 1_000);
        let next = tokens.refreshed(response("B", None), 5_000);

        assert_eq!(next.access_token.expose_secret(), "B");
        assert_eq!(
            next.refresh_token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("R")
        );
        assert_eq!(next.expires_at_epoch_seconds, 8_600);
    }

    #[test]
    fn test_refresh_adopts_rotated_refresh_token() {
        let tokens = TokenSet::from_response(response("A", Some("R")), 1_000);
        let next = tokens.refreshed(response("B", Some("R2")), 5_000);

        assert_eq!(
            next.refresh_token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("R2")
        );
    }

    #[test]
    fn test_response_parses_minimal_body() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"tok1","expires_in":60}"#).unwrap();
        assert_eq!(parsed.access_token, "tok1");
        assert!(parsed.refresh_token.is_none());
    }
}
