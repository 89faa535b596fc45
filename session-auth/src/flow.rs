//! Authorization state machine and token-freshness contract.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use events::{AuthEvent, AuthStateEmitter, SignOutReason};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{authorization_error, AuthorizationErrorKind, Error, ErrorKind};
use crate::oauth::token::{TokenCache, TokenResponse, TokenSet};
use crate::oauth::{
    AuthorizationRequest, AuthorizationUi, ClientRegistration, Provider, ServiceConfiguration,
};

/// Margin applied to token expiry so a token is not used right before it lapses.
pub const DEFAULT_EXPIRY_SKEW_SECONDS: i64 = 60;

/// Where the session is in the sign-in lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    SignedOut,
    AuthorizationPending,
    SignedIn,
}

struct Session {
    state: AuthorizationState,
    tokens: TokenCache,
    /// Bumped on every transition that invalidates in-flight network work.
    generation: u64,
    /// Fired by `sign_out` to abandon a pending authorization.
    cancel: Option<watch::Sender<bool>>,
}

impl Session {
    fn reset(&mut self) {
        self.tokens.clear();
        self.state = AuthorizationState::SignedOut;
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
    }
}

enum CachedToken {
    Fresh(SecretString),
    Expired {
        refresh_token: Option<SecretString>,
        generation: u64,
    },
}

/// Orchestrates the authorization-code flow for a single session.
///
/// Owns the token cache. Tokens are only written when a network call completes,
/// and a sign-out that lands while a call is in flight always wins.
pub struct AuthFlow {
    registration: ClientRegistration,
    provider: Arc<dyn Provider>,
    ui: Arc<dyn AuthorizationUi>,
    clock: Arc<dyn Clock>,
    emitter: Arc<AuthStateEmitter>,
    skew_seconds: i64,
    configuration: OnceCell<ServiceConfiguration>,
    session: Mutex<Session>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthFlow {
    pub fn new(
        registration: ClientRegistration,
        provider: Arc<dyn Provider>,
        ui: Arc<dyn AuthorizationUi>,
        emitter: Arc<AuthStateEmitter>,
    ) -> Self {
        Self {
            registration,
            provider,
            ui,
            clock: Arc::new(SystemClock),
            emitter,
            skew_seconds: DEFAULT_EXPIRY_SKEW_SECONDS,
            configuration: OnceCell::new(),
            session: Mutex::new(Session {
                state: AuthorizationState::SignedOut,
                tokens: TokenCache::new(),
                generation: 0,
                cancel: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_expiry_skew(mut self, skew_seconds: i64) -> Self {
        self.skew_seconds = skew_seconds;
        self
    }

    /// The emitter lifecycle events are published on.
    pub fn emitter(&self) -> &Arc<AuthStateEmitter> {
        &self.emitter
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the discovery document once and cache it for the process lifetime.
    ///
    /// Concurrent callers share one request. A failure is not cached and not
    /// retried; the next call tries again.
    pub async fn fetch_service_configuration(&self) -> Result<&ServiceConfiguration, Error> {
        self.configuration
            .get_or_try_init(|| async {
                let configuration = self.provider.fetch_configuration().await.map_err(|e| {
                    warn!("Service configuration unavailable: {}", e);
                    e
                })?;
                debug!(
                    "Authorization endpoint {}, token endpoint {}",
                    configuration.authorization_endpoint, configuration.token_endpoint
                );
                Ok::<_, Error>(configuration)
            })
            .await
    }

    /// Cached discovery metadata, if it has been fetched.
    pub fn service_configuration(&self) -> Option<&ServiceConfiguration> {
        self.configuration.get()
    }

    /// Run the interactive authorization flow through to a signed-in session.
    ///
    /// Fails with `NotConfigured` before discovery and with `FlowInProgress` while
    /// another request is pending. Any other failure returns the session to
    /// SignedOut as an `Authorization` error.
    ///
    /// Called while signed in, the current session is ended first and SIGN_OUT
    /// is emitted before the new request is presented.
    pub async fn make_authorization_request(&self, login_hint: Option<&str>) -> Result<(), Error> {
        let configuration = self
            .configuration
            .get()
            .ok_or_else(|| Error::new(ErrorKind::NotConfigured))?;

        let (generation, ended_session, mut cancelled) = {
            let mut session = self.session();
            let ended_session = match session.state {
                AuthorizationState::AuthorizationPending => {
                    return Err(Error::new(ErrorKind::FlowInProgress));
                }
                AuthorizationState::SignedIn => {
                    info!("Ending the current session before a new authorization");
                    session.reset();
                    true
                }
                AuthorizationState::SignedOut => false,
            };
            let (cancel, cancelled) = watch::channel(false);
            session.tokens.clear();
            session.state = AuthorizationState::AuthorizationPending;
            session.generation += 1;
            session.cancel = Some(cancel);
            (session.generation, ended_session, cancelled)
        };

        if ended_session {
            self.emitter.emit(AuthEvent::SignOut {
                reason: SignOutReason::UserRequested,
            });
        }

        let request = AuthorizationRequest::new(
            &configuration.authorization_endpoint,
            &self.registration,
            login_hint,
        );
        info!("Authorization request started");

        let result = tokio::select! {
            result = self.complete_authorization(configuration, &request) => result,
            _ = cancelled.changed() => {
                info!("Authorization request abandoned");
                Err(authorization_error(
                    AuthorizationErrorKind::Cancelled,
                    "Sign-in was cancelled",
                ))
            }
        };

        match result {
            Ok(response) => {
                let expires_at_epoch_seconds = {
                    let mut session = self.session();
                    if session.generation != generation
                        || session.state != AuthorizationState::AuthorizationPending
                    {
                        warn!("Authorization finished after the session was reset, discarding tokens");
                        return Err(authorization_error(
                            AuthorizationErrorKind::Cancelled,
                            "Sign-in was cancelled",
                        ));
                    }
                    let tokens = TokenSet::from_response(response, self.clock.now_epoch_seconds());
                    let expires_at = tokens.expires_at_epoch_seconds;
                    session.tokens.store(tokens);
                    session.state = AuthorizationState::SignedIn;
                    session.cancel = None;
                    expires_at
                };

                info!("Signed in");
                self.emitter.emit(AuthEvent::TokenResponse {
                    expires_at_epoch_seconds,
                });
                Ok(())
            }
            Err(e) => {
                {
                    let mut session = self.session();
                    if session.generation == generation
                        && session.state == AuthorizationState::AuthorizationPending
                    {
                        session.tokens.clear();
                        session.state = AuthorizationState::SignedOut;
                        session.cancel = None;
                    }
                }
                warn!("Authorization failed: {}", e);
                Err(into_authorization_error(e))
            }
        }
    }

    async fn complete_authorization(
        &self,
        configuration: &ServiceConfiguration,
        request: &AuthorizationRequest,
    ) -> Result<TokenResponse, Error> {
        let response = self.ui.present(request).await?;
        let code = response.into_code(&request.state)?;
        self.provider
            .exchange_code(configuration, &code, request.pkce_verifier.as_str())
            .await
    }

    fn cached_token(&self) -> Result<CachedToken, Error> {
        let session = self.session();
        let tokens = match (session.state, session.tokens.current()) {
            (AuthorizationState::SignedIn, Some(tokens)) => tokens,
            _ => return Err(Error::new(ErrorKind::NotSignedIn)),
        };

        if !tokens.is_expired(self.clock.now_epoch_seconds(), self.skew_seconds) {
            return Ok(CachedToken::Fresh(tokens.access_token.clone()));
        }

        Ok(CachedToken::Expired {
            refresh_token: tokens.refresh_token.clone(),
            generation: session.generation,
        })
    }

    /// Get a usable access token, refreshing it first if it has expired.
    ///
    /// A fresh cached token is returned without any network call. Concurrent
    /// callers share a single refresh. If the refresh fails the session is
    /// signed out and the caller must start a new authorization.
    pub async fn perform_with_fresh_tokens(&self) -> Result<SecretString, Error> {
        if let CachedToken::Fresh(token) = self.cached_token()? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check: another caller may have refreshed while we waited.
        let (refresh_token, generation) = match self.cached_token()? {
            CachedToken::Fresh(token) => {
                debug!("Token was refreshed by another caller");
                return Ok(token);
            }
            CachedToken::Expired {
                refresh_token,
                generation,
            } => (refresh_token, generation),
        };

        debug!("Access token expired, refreshing");
        let result = match (refresh_token, self.configuration.get()) {
            (Some(refresh_token), Some(configuration)) => {
                self.provider
                    .refresh_token(configuration, refresh_token.expose_secret())
                    .await
            }
            (None, _) => Err(authorization_error(
                AuthorizationErrorKind::TokenRejected,
                "No refresh token available",
            )),
            (_, None) => Err(Error::new(ErrorKind::NotConfigured)),
        };

        match result {
            Ok(response) => {
                let mut session = self.session();
                if session.generation != generation
                    || session.state != AuthorizationState::SignedIn
                {
                    return Err(Error::new(ErrorKind::NotSignedIn));
                }
                let now = self.clock.now_epoch_seconds();
                let next = match session.tokens.current() {
                    Some(current) => current.refreshed(response, now),
                    None => TokenSet::from_response(response, now),
                };
                let access_token = next.access_token.clone();
                session.tokens.store(next);
                info!("Access token refreshed");
                Ok(access_token)
            }
            Err(e) => {
                warn!("Token refresh failed, signing out: {}", e);
                let signed_out = {
                    let mut session = self.session();
                    if session.generation == generation
                        && session.state == AuthorizationState::SignedIn
                    {
                        session.reset();
                        true
                    } else {
                        false
                    }
                };
                if signed_out {
                    self.emitter.emit(AuthEvent::SignOut {
                        reason: SignOutReason::RefreshFailed,
                    });
                }
                Err(Error::new(ErrorKind::ReauthorizationRequired).with_source(e))
            }
        }
    }

    /// Drop the session from any state. Always succeeds.
    ///
    /// A pending authorization is abandoned: its UI is dropped and the request
    /// fails with `Cancelled`.
    pub fn sign_out(&self) {
        self.session().reset();
        info!("Signed out");
        self.emitter.emit(AuthEvent::SignOut {
            reason: SignOutReason::UserRequested,
        });
    }

    /// True iff the session is signed in and holds tokens.
    pub fn logged_in(&self) -> bool {
        let session = self.session();
        session.state == AuthorizationState::SignedIn && session.tokens.current().is_some()
    }

    pub fn state(&self) -> AuthorizationState {
        self.session().state
    }

    /// Expiry of the held access token, in seconds since the Unix epoch.
    pub fn token_expiry(&self) -> Option<i64> {
        self.session()
            .tokens
            .current()
            .map(|tokens| tokens.expires_at_epoch_seconds)
    }
}

fn into_authorization_error(err: Error) -> Error {
    match err.error_kind {
        ErrorKind::Authorization(_) => err,
        _ => Error::new(ErrorKind::Authorization(AuthorizationErrorKind::Network)).with_source(err),
    }
}
