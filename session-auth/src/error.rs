//! Error types for the `session-auth` crate.
//!
//! Follows the same pattern as the rest of the workspace: a root Error struct
//! holding an error kind and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for session-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in session-auth.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// The discovery document could not be fetched or parsed.
    Discovery(DiscoveryErrorKind),
    /// An authorization request was attempted before discovery completed.
    NotConfigured,
    /// The interactive flow or the code exchange failed. State is back to SignedOut.
    Authorization(AuthorizationErrorKind),
    /// A token was requested while no session exists.
    NotSignedIn,
    /// The refresh token can no longer be used. The session has been signed out.
    ReauthorizationRequired,
    /// An authorization request is already pending for this session.
    FlowInProgress,
    /// The profile endpoint call failed. Session state is untouched.
    ProfileFetch(ProfileErrorKind),
    Http(HttpErrorKind),
}

/// Errors from fetching the discovery document.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryErrorKind {
    Network,
    Timeout,
    Status(u16),
    InvalidDocument,
}

/// Errors from the interactive flow and the token endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationErrorKind {
    AccessDenied,
    InvalidState,
    MissingCode,
    Cancelled,
    TokenRejected,
    Network,
    Timeout,
    InvalidResponse,
}

/// Errors from the profile endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileErrorKind {
    Network,
    Status(u16),
    InvalidResponse,
}

/// Errors from HTTP client operations.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Network,
}

impl Error {
    /// Build an error with no underlying source.
    pub fn new(error_kind: ErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Discovery(kind) => write!(f, "Discovery error: {:?}", kind)?,
            ErrorKind::NotConfigured => write!(f, "Service configuration has not been fetched")?,
            ErrorKind::Authorization(kind) => write!(f, "Authorization error: {:?}", kind)?,
            ErrorKind::NotSignedIn => write!(f, "Not signed in")?,
            ErrorKind::ReauthorizationRequired => {
                write!(f, "Session expired, sign in again")?
            }
            ErrorKind::FlowInProgress => write!(f, "An authorization request is already in progress")?,
            ErrorKind::ProfileFetch(kind) => write!(f, "Profile fetch error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_request() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create discovery errors.
pub fn discovery_error(kind: DiscoveryErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Discovery(kind),
    }
}

/// Helper function to create authorization errors.
pub fn authorization_error(kind: AuthorizationErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Authorization(kind),
    }
}

/// Helper function to create profile fetch errors.
pub fn profile_error(kind: ProfileErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::ProfileFetch(kind),
    }
}

/// Classify a transport failure from the discovery request.
pub fn discovery_transport_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        DiscoveryErrorKind::Timeout
    } else {
        DiscoveryErrorKind::Network
    };
    Error::new(ErrorKind::Discovery(kind)).with_source(err)
}

/// Classify a transport failure from a token endpoint request.
pub fn token_transport_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        AuthorizationErrorKind::Timeout
    } else {
        AuthorizationErrorKind::Network
    };
    Error::new(ErrorKind::Authorization(kind)).with_source(err)
}
