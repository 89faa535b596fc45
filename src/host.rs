//! One-way signals to the host process.

use log::*;

/// Asks the host to bring the application window to the foreground.
///
/// Fire-and-forget: no response is expected and failures are the host's concern.
pub trait HostSignal: Send + Sync {
    fn request_focus(&self);
}

/// Host signal for the terminal shell, where there is no window to raise.
#[derive(Debug, Default)]
pub struct LogHostSignal;

impl HostSignal for LogHostSignal {
    fn request_focus(&self) {
        info!("app-focus requested");
    }
}
