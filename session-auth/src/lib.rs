//! # session-auth
//!
//! Session state machine and token-freshness contract for the desktop shell:
//! - OAuth 2.0 authorization-code flow with PKCE and CSRF state
//! - Discovery of the provider's endpoints (cached once per process)
//! - In-memory token cache with skewed expiry checks
//! - `perform_with_fresh_tokens`: cached access token or a transparent refresh
//! - Lifecycle notifications through `events::AuthStateEmitter`
//!
//! ## Architecture
//!
//! `AuthFlow` owns the `TokenCache` and the `AuthorizationState`. Everything that
//! talks to the outside world sits behind a trait so the state machine can be
//! exercised in isolation:
//! - `oauth::Provider` for the discovery document and the token endpoint
//! - `oauth::AuthorizationUi` for presenting the authorization request to the user
//! - `clock::Clock` for the current time
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_auth::{
//!     flow::AuthFlow,
//!     oauth::{providers::oidc, LoopbackRedirect},
//! };
//!
//! let flow = AuthFlow::new(registration, provider, ui, emitter);
//! flow.fetch_service_configuration().await?;
//! flow.make_authorization_request(None).await?;
//! let token = flow.perform_with_fresh_tokens().await?;
//! ```

pub mod clock;
pub mod error;
pub mod flow;
pub mod http;
pub mod oauth;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use flow::{AuthFlow, AuthorizationState};
