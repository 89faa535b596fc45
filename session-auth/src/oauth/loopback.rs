//! Loopback redirect listener for desktop authorization.
//!
//! The authorization URL is handed to a launcher (usually the system browser) and
//! the provider redirects back to a local HTTP listener bound to the redirect URI.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use super::provider::AuthorizationUi;
use super::request::{AuthorizationRequest, AuthorizationResponse};
use crate::error::{authorization_error, AuthorizationErrorKind, Error, ErrorKind};

/// Opens the authorization URL for the user.
pub type Launcher = Arc<dyn Fn(&Url) + Send + Sync>;

/// Authorization UI that listens on the redirect URI's host and port.
pub struct LoopbackRedirect {
    launcher: Launcher,
}

impl LoopbackRedirect {
    pub fn new(launcher: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        Self {
            launcher: Arc::new(launcher),
        }
    }

    async fn bind(redirect_uri: &Url) -> Result<TcpListener, Error> {
        let host = redirect_uri.host_str().ok_or_else(|| {
            authorization_error(
                AuthorizationErrorKind::Network,
                "Redirect URI has no host to listen on",
            )
        })?;
        let port = redirect_uri.port_or_known_default().unwrap_or(80);

        TcpListener::bind((host, port)).await.map_err(|e| {
            Error::new(ErrorKind::Authorization(AuthorizationErrorKind::Network)).with_source(e)
        })
    }
}

#[async_trait]
impl AuthorizationUi for LoopbackRedirect {
    async fn present(&self, request: &AuthorizationRequest) -> Result<AuthorizationResponse, Error> {
        let listener = Self::bind(&request.redirect_uri).await?;
        info!("Waiting for authorization redirect on {}", request.redirect_uri);

        (self.launcher)(&request.url);

        loop {
            let (mut socket, _) = listener.accept().await.map_err(|e| {
                Error::new(ErrorKind::Authorization(AuthorizationErrorKind::Network))
                    .with_source(e)
            })?;

            match handle_connection(&mut socket, &request.redirect_uri).await {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => continue,
                Err(e) => warn!("Error handling redirect connection: {}", e),
            }
        }
    }
}

/// Handle one HTTP request. Returns the callback parameters if this request hit the redirect path.
async fn handle_connection(
    socket: &mut TcpStream,
    redirect_uri: &Url,
) -> std::io::Result<Option<AuthorizationResponse>> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain the headers so closing the socket does not reset the connection.
    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    debug!(request = %request_line.trim(), "Received redirect request");

    // Request line: GET /path?query HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or("/");

    if method != "GET" {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(None);
    }

    let callback = match redirect_uri.join(target) {
        Ok(url) if url.path() == redirect_uri.path() => url,
        _ => {
            send_response(&mut writer, 404, "Not Found", "Not Found").await?;
            return Ok(None);
        }
    };

    let response = AuthorizationResponse::from_redirect(&callback);
    if !response.is_complete() {
        debug!("Ignoring redirect request without code or error");
        send_response(&mut writer, 400, "Bad Request", "Bad Request").await?;
        return Ok(None);
    }

    let page = match &response.error {
        Some(error) => error_page(error),
        None => success_page(),
    };
    send_response(&mut writer, 200, "OK", &page).await?;

    Ok(Some(response))
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Signed in</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Authorization complete</h1>
<p>You can close this window and return to the application.</p>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str) -> String {
    let escaped: String = error
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign-in failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Authorization failed</h1>
<p>Error: {}</p>
<p>You can close this window and try again.</p>
</body>
</html>"#,
        escaped
    )
}
