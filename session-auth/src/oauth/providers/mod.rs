//! Provider implementations.

pub mod oidc;
