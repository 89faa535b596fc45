//! Presentation contract: what the shell shows for a given session state.
//!
//! The session core never touches UI elements. It derives a `ViewState` and
//! hands it to a `Presenter`.

use std::time::Duration;

use crate::profile::UserProfile;
use session_auth::Error;

pub const SIGN_IN: &str = "Sign-In";
pub const SIGN_OUT: &str = "Sign-Out";

/// How long the welcome notification stays up.
pub const WELCOME_TIMEOUT: Duration = Duration::from_millis(4000);

/// Card shown once a profile has been fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct UserCard {
    pub name: String,
    pub image_url: String,
}

/// Everything the presentation layer needs to render the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// Label of the toggle button.
    pub sign_in_label: &'static str,
    /// Whether the "fetch profile" action is offered.
    pub profile_action_visible: bool,
    pub user_card: Option<UserCard>,
}

impl ViewState {
    /// Baseline before sign-in and after sign-out.
    pub fn signed_out() -> Self {
        Self {
            sign_in_label: SIGN_IN,
            profile_action_visible: false,
            user_card: None,
        }
    }

    pub fn signed_in(profile: Option<&UserProfile>) -> Self {
        Self {
            sign_in_label: SIGN_OUT,
            profile_action_visible: true,
            user_card: profile.map(|profile| UserCard {
                name: profile.name.clone(),
                image_url: profile.avatar_url(),
            }),
        }
    }
}

/// A transient message (snackbar).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub timeout: Duration,
}

impl Notification {
    pub fn welcome(profile: &UserProfile) -> Self {
        Self {
            message: format!("Welcome {}", profile.name),
            timeout: WELCOME_TIMEOUT,
        }
    }
}

/// Renders session state. Implemented by the UI layer.
pub trait Presenter: Send + Sync {
    fn render(&self, view: &ViewState);

    fn notify(&self, notification: &Notification);

    /// Show a failure the user needs to act on (e.g. sign in again).
    fn report_error(&self, error: &Error);
}

/// Presenter for the terminal shell.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn render(&self, view: &ViewState) {
        match &view.user_card {
            Some(card) => println!("[{}] {} <{}>", view.sign_in_label, card.name, card.image_url),
            None if view.profile_action_visible => {
                println!("[{}] signed in, type `profile` to load your profile", view.sign_in_label)
            }
            None => println!("[{}] signed out", view.sign_in_label),
        }
    }

    fn notify(&self, notification: &Notification) {
        println!("* {}", notification.message);
    }

    fn report_error(&self, error: &Error) {
        eprintln!("! {}", error);
    }
}
