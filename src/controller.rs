//! Bridges session lifecycle events to the presentation layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use events::{AuthEvent, EventKind, HandlerError, Subscription};
use log::*;
use secrecy::ExposeSecret;
use session_auth::{AuthFlow, AuthorizationState, Error, ErrorKind};

use crate::host::HostSignal;
use crate::profile::{ProfileSource, UserProfile};
use crate::view::{Notification, Presenter, ViewState};

/// Profile slot shared with the event listeners.
///
/// `epoch` moves on every sign-in and sign-out so a profile fetched for an
/// earlier session is never stored.
#[derive(Default)]
struct ProfileSlot {
    profile: Mutex<Option<UserProfile>>,
    epoch: AtomicU64,
}

impl ProfileSlot {
    fn lock(&self) -> MutexGuard<'_, Option<UserProfile>> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.lock() = None;
    }
}

/// Drives sign-in, sign-out and profile fetches for the shell.
///
/// Holds no session logic of its own: state lives in [`AuthFlow`], and the
/// view is re-derived from it whenever a lifecycle event arrives.
pub struct SessionController {
    flow: Arc<AuthFlow>,
    profiles: Arc<dyn ProfileSource>,
    presenter: Arc<dyn Presenter>,
    slot: Arc<ProfileSlot>,
    subscriptions: Vec<Subscription>,
}

impl SessionController {
    /// Render the signed-out baseline and start listening for lifecycle events.
    pub fn new(
        flow: Arc<AuthFlow>,
        profiles: Arc<dyn ProfileSource>,
        presenter: Arc<dyn Presenter>,
        host: Arc<dyn HostSignal>,
    ) -> Self {
        let slot = Arc::new(ProfileSlot::default());
        let emitter = flow.emitter();

        let on_token_response = emitter.on(EventKind::TokenResponse, {
            let slot = Arc::clone(&slot);
            let presenter = Arc::clone(&presenter);
            move |_: &AuthEvent| -> Result<(), HandlerError> {
                slot.reset();
                presenter.render(&ViewState::signed_in(None));
                host.request_focus();
                Ok(())
            }
        });

        let on_sign_out = emitter.on(EventKind::SignOut, {
            let slot = Arc::clone(&slot);
            let presenter = Arc::clone(&presenter);
            move |event: &AuthEvent| -> Result<(), HandlerError> {
                debug!("Session ended: {:?}", event);
                slot.reset();
                presenter.render(&ViewState::signed_out());
                Ok(())
            }
        });

        presenter.render(&ViewState::signed_out());

        Self {
            flow,
            profiles,
            presenter,
            slot,
            subscriptions: vec![on_token_response, on_sign_out],
        }
    }

    /// Discover the provider if needed, then run the interactive sign-in.
    ///
    /// Does nothing when already signed in. Failures are reported to the
    /// presenter and also returned.
    pub async fn sign_in(&self, login_hint: Option<&str>) -> Result<(), Error> {
        if self.flow.logged_in() {
            info!("Already signed in");
            return Ok(());
        }

        let result = match self.flow.fetch_service_configuration().await {
            Ok(_) => self.flow.make_authorization_request(login_hint).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!("Sign-in failed: {}", e);
            self.presenter.report_error(e);
        }
        result
    }

    /// Sign out and reset the view. The reset happens through the SIGN_OUT listener.
    pub fn sign_out(&self) {
        self.flow.sign_out();
    }

    /// Fetch the signed-in user's profile and show it.
    ///
    /// A failed fetch leaves the previous profile and the signed-in view as
    /// they were. Only a rejected refresh changes session state, and that
    /// sign-out has already been applied by the time this returns.
    pub async fn fetch_profile(&self) -> Result<UserProfile, Error> {
        let epoch = self.slot.epoch.load(Ordering::SeqCst);

        let profile = match self.fetch_with_fresh_token().await {
            Ok(profile) => profile,
            Err(e) => {
                match e.error_kind {
                    ErrorKind::ReauthorizationRequired | ErrorKind::NotSignedIn => {
                        self.presenter.report_error(&e)
                    }
                    _ => warn!("Profile fetch failed: {}", e),
                }
                return Err(e);
            }
        };

        {
            let mut current = self.slot.lock();
            if self.slot.epoch.load(Ordering::SeqCst) != epoch || !self.flow.logged_in() {
                info!("Session changed while fetching the profile, discarding it");
                return Err(Error::new(ErrorKind::NotSignedIn));
            }
            *current = Some(profile.clone());
        }

        info!("Loaded profile for {}", profile.email);
        self.presenter.render(&ViewState::signed_in(Some(&profile)));
        self.presenter.notify(&Notification::welcome(&profile));
        Ok(profile)
    }

    async fn fetch_with_fresh_token(&self) -> Result<UserProfile, Error> {
        let token = self.flow.perform_with_fresh_tokens().await?;
        self.profiles.fetch(token.expose_secret()).await
    }

    /// Last successfully fetched profile for the current session.
    pub fn profile(&self) -> Option<UserProfile> {
        self.slot.lock().clone()
    }

    pub fn logged_in(&self) -> bool {
        self.flow.logged_in()
    }

    pub fn state(&self) -> AuthorizationState {
        self.flow.state()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            self.flow.emitter().off(subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::HttpProfileClient;
    use async_trait::async_trait;
    use events::AuthStateEmitter;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use session_auth::error::{AuthorizationErrorKind, ProfileErrorKind};
    use session_auth::oauth::providers::oidc;
    use session_auth::oauth::{
        AuthorizationRequest, AuthorizationResponse, AuthorizationUi, ClientRegistration,
    };
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    const JANE_GRAVATAR: &str =
        "https://www.gravatar.com/avatar/8e747d19e83ff063fbb509e348a296d4?sz=96";

    #[derive(Default)]
    struct RecordingPresenter {
        views: Mutex<Vec<ViewState>>,
        notifications: Mutex<Vec<Notification>>,
        errors: Mutex<Vec<ErrorKind>>,
    }

    impl RecordingPresenter {
        fn last_view(&self) -> ViewState {
            self.views.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Presenter for RecordingPresenter {
        fn render(&self, view: &ViewState) {
            self.views.lock().unwrap().push(view.clone());
        }

        fn notify(&self, notification: &Notification) {
            self.notifications.lock().unwrap().push(notification.clone());
        }

        fn report_error(&self, error: &Error) {
            self.errors.lock().unwrap().push(error.error_kind.clone());
        }
    }

    #[derive(Default)]
    struct CountingHost(AtomicUsize);

    impl HostSignal for CountingHost {
        fn request_focus(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Approves every request with the given code, echoing the CSRF state.
    struct ApprovingUi(&'static str);

    #[async_trait]
    impl AuthorizationUi for ApprovingUi {
        async fn present(
            &self,
            request: &AuthorizationRequest,
        ) -> Result<AuthorizationResponse, Error> {
            Ok(AuthorizationResponse {
                code: Some(self.0.to_string()),
                state: Some(request.state.as_str().to_string()),
                ..Default::default()
            })
        }
    }

    struct Harness {
        server: ServerGuard,
        controller: SessionController,
        presenter: Arc<RecordingPresenter>,
        host: Arc<CountingHost>,
    }

    async fn harness() -> Harness {
        let server = Server::new_async().await;
        let registration = ClientRegistration::new(
            "client-123",
            Url::parse("http://127.0.0.1:8000").unwrap(),
            vec!["openid".to_string(), "profile".to_string(), "email".to_string()],
        );
        let provider = oidc::Provider::new(
            Url::parse(&format!("{}/.well-known/openid-configuration", server.url())).unwrap(),
            registration.clone(),
            reqwest::Client::new(),
        );
        let flow = Arc::new(AuthFlow::new(
            registration,
            Arc::new(provider),
            Arc::new(ApprovingUi("code123")),
            Arc::new(AuthStateEmitter::new()),
        ));
        let profiles = HttpProfileClient::new(
            reqwest::Client::new(),
            Url::parse(&format!("{}/oidc/2/me", server.url())).unwrap(),
        );
        let presenter = Arc::new(RecordingPresenter::default());
        let host = Arc::new(CountingHost::default());
        let controller = SessionController::new(
            flow,
            Arc::new(profiles),
            presenter.clone(),
            host.clone(),
        );

        Harness {
            server,
            controller,
            presenter,
            host,
        }
    }

    async fn mock_discovery(server: &mut ServerGuard) -> Mock {
        let body = format!(
            r#"{{"issuer":"{0}","authorization_endpoint":"{0}/auth","token_endpoint":"{0}/token"}}"#,
            server.url()
        );
        server
            .mock("GET", "/.well-known/openid-configuration")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    async fn mock_code_exchange(server: &mut ServerGuard, body: &str) -> Mock {
        server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "code123".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    async fn mock_profile(server: &mut ServerGuard, status: usize, body: &str) -> Mock {
        server
            .mock("GET", "/oidc/2/me")
            .match_header("authorization", "Bearer tok1")
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_starts_with_signed_out_view() {
        let h = harness().await;

        assert_eq!(h.presenter.last_view(), ViewState::signed_out());
        assert_eq!(h.controller.state(), AuthorizationState::SignedOut);
        assert!(h.controller.profile().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_renders_signed_in_and_requests_focus() {
        let mut h = harness().await;
        let discovery = mock_discovery(&mut h.server).await;
        let exchange =
            mock_code_exchange(&mut h.server, r#"{"access_token":"tok1","expires_in":3600}"#)
                .await;

        h.controller.sign_in(None).await.unwrap();

        assert!(h.controller.logged_in());
        assert_eq!(h.presenter.last_view(), ViewState::signed_in(None));
        assert_eq!(h.host.0.load(Ordering::SeqCst), 1);
        discovery.assert_async().await;
        exchange.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_in_when_already_signed_in_is_a_no_op() {
        let mut h = harness().await;
        mock_discovery(&mut h.server).await;
        let exchange =
            mock_code_exchange(&mut h.server, r#"{"access_token":"tok1","expires_in":3600}"#)
                .await;

        h.controller.sign_in(None).await.unwrap();
        h.controller.sign_in(None).await.unwrap();

        assert_eq!(h.host.0.load(Ordering::SeqCst), 1);
        exchange.assert_async().await;
    }

    #[tokio::test]
    async fn test_discovery_failure_is_reported() {
        let mut h = harness().await;
        h.server
            .mock("GET", "/.well-known/openid-configuration")
            .with_status(503)
            .create_async()
            .await;

        let err = h.controller.sign_in(None).await.unwrap_err();

        assert!(matches!(err.error_kind, ErrorKind::Discovery(_)));
        assert_eq!(h.presenter.errors.lock().unwrap().len(), 1);
        assert_eq!(h.controller.state(), AuthorizationState::SignedOut);
        assert_eq!(h.presenter.last_view(), ViewState::signed_out());
        assert_eq!(h.host.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_code_is_reported() {
        let mut h = harness().await;
        mock_discovery(&mut h.server).await;
        h.server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = h.controller.sign_in(None).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::Authorization(AuthorizationErrorKind::TokenRejected)
        );
        assert!(!h.controller.logged_in());
        assert_eq!(
            *h.presenter.errors.lock().unwrap(),
            vec![ErrorKind::Authorization(AuthorizationErrorKind::TokenRejected)]
        );
    }

    #[tokio::test]
    async fn test_profile_fetch_uses_gravatar_fallback() {
        let mut h = harness().await;
        mock_discovery(&mut h.server).await;
        mock_code_exchange(&mut h.server, r#"{"access_token":"tok1","expires_in":3600}"#).await;
        let profile_mock = mock_profile(
            &mut h.server,
            200,
            r#"{"name":"Jane Doe","email":"jane@x.com"}"#,
        )
        .await;
        h.controller.sign_in(None).await.unwrap();

        let profile = h.controller.fetch_profile().await.unwrap();

        assert_eq!(profile.avatar_url(), JANE_GRAVATAR);
        assert_eq!(h.controller.profile(), Some(profile.clone()));
        let card = h.presenter.last_view().user_card.unwrap();
        assert_eq!(card.name, "Jane Doe");
        assert_eq!(card.image_url, JANE_GRAVATAR);
        assert_eq!(
            *h.presenter.notifications.lock().unwrap(),
            vec![Notification::welcome(&profile)]
        );
        profile_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_profile_fetch_keeps_session_and_previous_profile() {
        let mut h = harness().await;
        mock_discovery(&mut h.server).await;
        mock_code_exchange(&mut h.server, r#"{"access_token":"tok1","expires_in":3600}"#).await;
        let ok = mock_profile(
            &mut h.server,
            200,
            r#"{"name":"Jane Doe","email":"jane@x.com"}"#,
        )
        .await;
        h.controller.sign_in(None).await.unwrap();
        let first = h.controller.fetch_profile().await.unwrap();
        ok.remove_async().await;

        mock_profile(&mut h.server, 500, "{}").await;
        let views_before = h.presenter.views.lock().unwrap().len();
        let err = h.controller.fetch_profile().await.unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::ProfileFetch(ProfileErrorKind::Status(500))
        );
        assert!(h.controller.logged_in());
        assert_eq!(h.controller.profile(), Some(first));
        assert_eq!(h.presenter.views.lock().unwrap().len(), views_before);
        assert!(h.presenter.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoked_refresh_resets_view_to_signed_out() {
        let mut h = harness().await;
        mock_discovery(&mut h.server).await;
        // Lifetime equal to the default skew: expired as soon as it is stored.
        mock_code_exchange(
            &mut h.server,
            r#"{"access_token":"tok1","expires_in":60,"refresh_token":"R"}"#,
        )
        .await;
        let refresh = h
            .server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .expect(1)
            .create_async()
            .await;
        let profile_mock = h
            .server
            .mock("GET", "/oidc/2/me")
            .expect(0)
            .create_async()
            .await;
        h.controller.sign_in(None).await.unwrap();

        let err = h.controller.fetch_profile().await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::ReauthorizationRequired);
        assert!(!h.controller.logged_in());
        assert_eq!(h.presenter.last_view(), ViewState::signed_out());
        assert_eq!(
            *h.presenter.errors.lock().unwrap(),
            vec![ErrorKind::ReauthorizationRequired]
        );
        refresh.assert_async().await;
        profile_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_out_drops_profile_and_resets_view() {
        let mut h = harness().await;
        mock_discovery(&mut h.server).await;
        mock_code_exchange(&mut h.server, r#"{"access_token":"tok1","expires_in":3600}"#).await;
        mock_profile(
            &mut h.server,
            200,
            r#"{"name":"Jane Doe","email":"jane@x.com"}"#,
        )
        .await;
        h.controller.sign_in(None).await.unwrap();
        h.controller.fetch_profile().await.unwrap();

        h.controller.sign_out();

        assert!(h.controller.profile().is_none());
        assert_eq!(h.presenter.last_view(), ViewState::signed_out());
        assert_eq!(h.controller.state(), AuthorizationState::SignedOut);
    }

    #[tokio::test]
    async fn test_profile_fetch_requires_sign_in() {
        let h = harness().await;

        let err = h.controller.fetch_profile().await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::NotSignedIn);
        assert_eq!(
            *h.presenter.errors.lock().unwrap(),
            vec![ErrorKind::NotSignedIn]
        );
    }

    #[tokio::test]
    async fn test_drop_unsubscribes_listeners() {
        let h = harness().await;
        let emitter = Arc::clone(h.controller.flow.emitter());
        assert_eq!(emitter.listener_count(EventKind::TokenResponse), 1);
        assert_eq!(emitter.listener_count(EventKind::SignOut), 1);

        drop(h.controller);

        assert_eq!(emitter.listener_count(EventKind::TokenResponse), 0);
        assert_eq!(emitter.listener_count(EventKind::SignOut), 0);
    }
}
