use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::time::Duration;
use url::Url;

/// Discovery document of the development identity provider.
pub const DEFAULT_DISCOVERY_URL: &str =
    "https://pied-piper-dev.onelogin.com/oidc/2/.well-known/openid-configuration";

/// Profile (userinfo) endpoint of the development identity provider.
pub const DEFAULT_PROFILE_URL: &str = "https://pied-piper-dev.onelogin.com/oidc/2/me";

/// Loopback address the provider redirects back to after sign-in.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8000";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Full URL of the provider's OpenID Connect discovery document.
    #[arg(long, env, default_value = DEFAULT_DISCOVERY_URL)]
    pub discovery_url: Url,

    /// The OAuth client ID registered for this application.
    #[arg(long, env)]
    client_id: Option<String>,

    /// The OAuth client secret, for providers that treat desktop apps as confidential clients.
    #[arg(long, env)]
    client_secret: Option<String>,

    /// Redirect URI registered with the provider. Must be a loopback address.
    #[arg(long, env, default_value = DEFAULT_REDIRECT_URI)]
    pub redirect_uri: Url,

    /// Scopes requested during sign-in.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "openid,profile,email"
    )]
    pub scopes: Vec<String>,

    /// Endpoint queried for the signed-in user's profile.
    #[arg(long, env, default_value = DEFAULT_PROFILE_URL)]
    pub profile_url: Url,

    /// Seconds before expiry at which an access token is treated as expired.
    #[arg(long, env, default_value_t = 60)]
    pub expiry_skew_secs: i64,

    /// Timeout in seconds for discovery, token and profile requests.
    #[arg(long, env, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Returns the OAuth client ID, if configured.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Returns the OAuth client secret, if configured.
    pub fn client_secret(&self) -> Option<String> {
        self.client_secret.clone()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["appauth_shell", "--client-id", "client-123"]);

        assert_eq!(config.discovery_url.as_str(), DEFAULT_DISCOVERY_URL);
        assert_eq!(config.client_id(), Some("client-123"));
        assert_eq!(config.client_secret(), None);
        assert_eq!(config.redirect_uri.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(config.profile_url.as_str(), DEFAULT_PROFILE_URL);
        assert_eq!(config.expiry_skew_secs, 60);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level_filter, LevelFilter::Info);
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse_from([
            "appauth_shell",
            "--client-id",
            "client-123",
            "--scopes",
            "openid,offline_access",
            "--redirect-uri",
            "http://127.0.0.1:9000/callback",
            "--log-level-filter",
            "DEBUG",
        ]);

        assert_eq!(config.scopes, vec!["openid", "offline_access"]);
        assert_eq!(config.redirect_uri.port(), Some(9000));
        assert_eq!(config.log_level_filter, LevelFilter::Debug);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = Config::try_parse_from(["appauth_shell", "--profile-url", "not a url"]);
        assert!(result.is_err());
    }
}
