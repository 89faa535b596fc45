//! OAuth 2.0 authorization-code flow building blocks.
//!
//! Discovery, request construction with PKCE and CSRF state, callback parsing,
//! the provider and UI seams, and token types.

mod discovery;
mod loopback;
mod pkce;
mod provider;
mod request;
mod state;

pub mod providers;
pub mod token;

pub use discovery::ServiceConfiguration;
pub use loopback::LoopbackRedirect;
pub use pkce::{PkceChallenge, PkceVerifier};
pub use provider::{AuthorizationUi, Provider};
pub use request::{AuthorizationRequest, AuthorizationResponse, ClientRegistration};
pub use state::CsrfState;
