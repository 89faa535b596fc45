//! # appauth_shell
//!
//! Desktop sign-in shell on top of `session-auth`. `SessionController` turns
//! session lifecycle events into view updates, fetches the user's profile with
//! a fresh access token, and signals the host once sign-in completes.

pub mod controller;
pub mod host;
pub mod profile;
pub mod view;

pub use controller::SessionController;
