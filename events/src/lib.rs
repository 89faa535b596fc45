//! Session lifecycle events for the desktop shell.
//!
//! This crate provides the notifier that decouples the authorization state
//! machine from whatever renders it.
//!
//! # Architecture
//!
//! - **AuthEvent**: Enum of lifecycle events, each belonging to one named channel
//! - **EventHandler**: Trait for listeners; closures implement it directly
//! - **AuthStateEmitter**: Registry of listeners, dispatching synchronously
//! - **Subscription**: Non-owning registration token used to unregister
//!
//! This crate has no dependencies on internal crates, so both the auth core and
//! the application shell can depend on it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::*;

/// Named event channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TokenResponse,
    SignOut,
}

impl EventKind {
    /// Get the channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TokenResponse => "TOKEN_RESPONSE",
            EventKind::SignOut => "SIGN_OUT",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The user asked to sign out.
    UserRequested,
    /// The refresh token was rejected; a new interactive sign-in is needed.
    RefreshFailed,
}

/// Session lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// Emitted once a code exchange succeeded and the session is signed in.
    TokenResponse {
        /// Expiry of the freshly stored access token.
        expires_at_epoch_seconds: i64,
    },
    /// Emitted whenever the session returns to signed out.
    SignOut { reason: SignOutReason },
}

impl AuthEvent {
    /// The channel this event is delivered on.
    pub fn kind(&self) -> EventKind {
        match self {
            AuthEvent::TokenResponse { .. } => EventKind::TokenResponse,
            AuthEvent::SignOut { .. } => EventKind::SignOut,
        }
    }
}

/// Error a listener may report. It is logged and never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for handling lifecycle events.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &AuthEvent) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&AuthEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &AuthEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Registration token returned by [`AuthStateEmitter::on`].
///
/// Holding it does not keep the listener alive; pass it to
/// [`AuthStateEmitter::off`] to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Registration {
    id: u64,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
}

/// Dispatches lifecycle events to registered listeners.
///
/// Listeners of one channel run in registration order. Nothing is promised
/// about ordering across channels.
pub struct AuthStateEmitter {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl AuthStateEmitter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            registrations: Mutex::new(Vec::new()),
        }
    }

    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for one channel.
    pub fn on(&self, kind: EventKind, handler: impl EventHandler + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations().push(Registration {
            id,
            kind,
            handler: Arc::new(handler),
        });
        debug!("Registered listener {} on {}", id, kind);
        Subscription { id, kind }
    }

    /// Unregister a listener. Returns false if it was already removed.
    pub fn off(&self, subscription: &Subscription) -> bool {
        let mut registrations = self.registrations();
        let before = registrations.len();
        registrations.retain(|r| r.id != subscription.id);
        before != registrations.len()
    }

    /// Number of listeners currently registered on a channel.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registrations()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Invoke every listener of the event's channel before returning.
    ///
    /// A listener that errors or panics is logged and skipped; the remaining
    /// listeners still run. Listeners may register or unregister during
    /// dispatch, which takes effect from the next emit.
    pub fn emit(&self, event: AuthEvent) {
        let kind = event.kind();
        let handlers: Vec<(u64, Arc<dyn EventHandler>)> = self
            .registrations()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| (r.id, Arc::clone(&r.handler)))
            .collect();

        debug!("Emitting {} to {} listener(s)", kind, handlers.len());

        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Listener {} on {} failed: {}", id, kind, e),
                Err(_) => error!("Listener {} on {} panicked", id, kind),
            }
        }
    }
}

impl Default for AuthStateEmitter {
    fn default() -> Self {
        Self::new()
    }
}
