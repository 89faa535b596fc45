use std::sync::Arc;

use log::*;
use secrecy::SecretString;
use service::{config::Config, logging::Logger};
use session_auth::http::HttpClientBuilder;
use session_auth::oauth::{providers::oidc, ClientRegistration, LoopbackRedirect};
use session_auth::AuthFlow;
use tokio::io::{AsyncBufReadExt, BufReader};

use appauth_shell::host::LogHostSignal;
use appauth_shell::profile::HttpProfileClient;
use appauth_shell::view::ConsolePresenter;
use appauth_shell::SessionController;

const HELP: &str = "commands: sign-in [login_hint] | sign-out | profile | status | quit";

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    info!("Starting appauth shell");

    let Some(client_id) = config.client_id() else {
        error!("No OAuth client ID configured, set --client-id or CLIENT_ID");
        std::process::exit(1);
    };

    let http_client = match HttpClientBuilder::new()
        .with_timeout(config.http_timeout())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let mut registration = ClientRegistration::new(
        client_id,
        config.redirect_uri.clone(),
        config.scopes.clone(),
    );
    if let Some(secret) = config.client_secret() {
        registration = registration.with_client_secret(SecretString::new(secret));
    }

    let provider = oidc::Provider::new(
        config.discovery_url.clone(),
        registration.clone(),
        http_client.clone(),
    );
    let ui = LoopbackRedirect::new(|url| {
        println!("Open this URL in your browser to sign in:\n{}", url);
    });
    let flow = Arc::new(
        AuthFlow::new(
            registration,
            Arc::new(provider),
            Arc::new(ui),
            Arc::new(events::AuthStateEmitter::new()),
        )
        .with_expiry_skew(config.expiry_skew_secs),
    );
    let profiles = HttpProfileClient::new(http_client, config.profile_url.clone());

    let controller = Arc::new(SessionController::new(
        flow,
        Arc::new(profiles),
        Arc::new(ConsolePresenter),
        Arc::new(LogHostSignal),
    ));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read from stdin: {}", e);
                break;
            }
        };

        let mut words = line.split_whitespace();
        match words.next() {
            Some("sign-in") => {
                // Runs in the background so `sign-out` can abandon a pending sign-in.
                let controller = Arc::clone(&controller);
                let login_hint = words.next().map(str::to_string);
                tokio::spawn(async move {
                    // Failures are already reported by the controller.
                    let _ = controller.sign_in(login_hint.as_deref()).await;
                });
            }
            Some("sign-out") => controller.sign_out(),
            Some("profile") => {
                if let Ok(profile) = controller.fetch_profile().await {
                    debug!("Profile: {:?}", profile);
                }
            }
            Some("status") => println!("{:?}", controller.state()),
            Some("quit") | Some("exit") => break,
            Some(other) => println!("unknown command `{}`; {}", other, HELP),
            None => {}
        }
    }

    info!("Shutting down");
}
