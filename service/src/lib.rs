//! Runtime configuration and logging for the desktop shell.

pub mod config;
pub mod logging;
