//! Signed-in user's profile and the endpoint it is fetched from.

use async_trait::async_trait;
use log::*;
use md5::{Digest, Md5};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::{Deserialize, Serialize};
use session_auth::error::{profile_error, Error, ErrorKind, ProfileErrorKind};
use url::Url;

/// Size hint appended to avatar URLs.
const AVATAR_SIZE: u32 = 96;

/// Profile returned by the provider's `me` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default, rename = "profilePicture", alias = "picture")]
    pub profile_picture_url: Option<String>,
}

impl UserProfile {
    /// Avatar image for the user card.
    ///
    /// Falls back to Gravatar, keyed by the MD5 of the lower-cased email, when the
    /// provider has no picture.
    pub fn avatar_url(&self) -> String {
        match self.profile_picture_url.as_deref() {
            Some(picture) if !picture.is_empty() => format!("{}?sz={}", picture, AVATAR_SIZE),
            _ => {
                let hash = Md5::digest(self.email.to_lowercase().as_bytes());
                format!(
                    "https://www.gravatar.com/avatar/{}?sz={}",
                    hex::encode(hash),
                    AVATAR_SIZE
                )
            }
        }
    }
}

/// Source of profile data for an access token.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch(&self, access_token: &str) -> Result<UserProfile, Error>;
}

/// Fetches the profile over HTTP with a bearer token and caching disabled.
pub struct HttpProfileClient {
    client: reqwest::Client,
    profile_url: Url,
}

impl HttpProfileClient {
    pub fn new(client: reqwest::Client, profile_url: Url) -> Self {
        Self {
            client,
            profile_url,
        }
    }
}

#[async_trait]
impl ProfileSource for HttpProfileClient {
    async fn fetch(&self, access_token: &str) -> Result<UserProfile, Error> {
        debug!("Fetching user profile from {}", self.profile_url);

        let response = self
            .client
            .get(self.profile_url.clone())
            .bearer_auth(access_token)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach profile endpoint: {:?}", e);
                Error::new(ErrorKind::ProfileFetch(ProfileErrorKind::Network)).with_source(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Profile endpoint returned {}", status);
            return Err(profile_error(
                ProfileErrorKind::Status(status.as_u16()),
                &format!("Profile endpoint returned {}", status),
            ));
        }

        response.json::<UserProfile>().await.map_err(|e| {
            warn!("Failed to parse user profile: {:?}", e);
            Error::new(ErrorKind::ProfileFetch(ProfileErrorKind::InvalidResponse)).with_source(e)
        })
    }
}
