//! Local listener for the OAuth redirect back from the provider.
//!
//! The provider sends the browser to `redirect_uri`; when that points at
//! `http://localhost:<port>/auth/<provider>/callback` this server accepts the
//! request, shows a short page and hands the full callback URL to the caller.

use crate::{AuthError, AuthResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info};
use url::Url;

/// Default callback port, matching the default site origin.
pub const DEFAULT_CALLBACK_PORT: u16 = 9876;

/// Default callback timeout in seconds.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;

const CALLBACK_PATH_PREFIX: &str = "/auth/";

/// OAuth callback server configuration.
#[derive(Debug, Clone)]
pub struct OAuthCallbackServer {
    port: u16,
    timeout: Duration,
}

impl OAuthCallbackServer {
    pub fn new(port: u16, timeout_secs: u64) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT_SECS)
    }

    /// Listen on the port of a `http://localhost:<port>/...` redirect URI.
    pub fn for_redirect_uri(redirect_uri: &str, timeout_secs: u64) -> AuthResult<Self> {
        let url = Url::parse(redirect_uri)?;
        if url.scheme() != "http" || !matches!(url.host_str(), Some("localhost" | "127.0.0.1")) {
            return Err(AuthError::Config(format!(
                "Redirect URI {} is not a local http address",
                redirect_uri
            )));
        }
        let port = url.port_or_known_default().unwrap_or(80);
        Ok(Self::new(port, timeout_secs))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the port. Do this before sending the user to the provider so
    /// the redirect cannot arrive before anyone is listening.
    pub async fn listen(&self) -> AuthResult<CallbackListener> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::Config(format!("Failed to bind to {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();

        info!(port, "OAuth callback server listening");
        Ok(CallbackListener {
            listener,
            port,
            timeout: self.timeout,
        })
    }
}

/// A bound callback server waiting for its one request.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
    timeout: Duration,
}

impl CallbackListener {
    /// Port actually bound (differs from the configured one when that was 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the callback and return its full URL.
    pub async fn wait_for_callback(self) -> AuthResult<String> {
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let port = self.port;
        let listener = self.listener;

        let server_handle = tokio::spawn({
            let tx = tx.clone();
            async move {
                loop {
                    match listener.accept().await {
                        Ok((socket, _)) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, port, tx).await {
                                    error!("Error handling callback connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        let result = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(_)) => Err(AuthError::Config(
                "OAuth callback channel closed".to_string(),
            )),
            Err(_) => Err(AuthError::Timeout),
        };

        server_handle.abort();
        result
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    port: u16,
    tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.trim(), "Received callback request");

    // Headers are not needed, but must be read before the socket closes.
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    // GET /auth/github/callback?code=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        send_response(&mut writer, 400, "Bad Request", "Bad Request").await?;
        return Ok(());
    };

    if method != "GET" {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    }
    if !target.starts_with(CALLBACK_PATH_PREFIX) {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let url = Url::parse(&format!("http://localhost:{}{}", port, target))?;
    let denied = url
        .query_pairs()
        .find(|(k, _)| k == "error")
        .map(|(_, v)| v.into_owned());

    let page = match &denied {
        Some(reason) => error_page(reason),
        None => success_page(),
    };
    send_response(&mut writer, 200, "OK", &page).await?;

    if let Some(tx) = tx.lock().await.take() {
        let _ = tx.send(url.into());
    }
    Ok(())
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>DevSpark - Signing you in</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Almost there</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#
        .to_string()
}

fn error_page(reason: &str) -> String {
    let escaped = reason
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>DevSpark - Sign-in failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Sign-in failed</h1>
<p>{}</p>
</body>
</html>"#,
        escaped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_redirect_uri() {
        let server =
            OAuthCallbackServer::for_redirect_uri("http://localhost:8123/auth/github/callback", 5)
                .unwrap();
        assert_eq!(server.port(), 8123);
    }

    #[test]
    fn test_for_redirect_uri_rejects_remote() {
        let err =
            OAuthCallbackServer::for_redirect_uri("https://devspark.dev/auth/github/callback", 5)
                .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(OAuthCallbackServer::with_defaults().port(), DEFAULT_CALLBACK_PORT);
        assert_eq!(DEFAULT_CALLBACK_TIMEOUT_SECS, 120);
    }

    #[test]
    fn test_error_page_escapes() {
        assert!(error_page("<script>").contains("&lt;script&gt;"));
    }

    async fn send_raw(port: u16, request: &str) -> String {
        use tokio::io::AsyncReadExt;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_returns_full_callback_url() {
        let listener = OAuthCallbackServer::new(0, 5).listen().await.unwrap();
        let port = listener.port();
        let waiter = tokio::spawn(listener.wait_for_callback());

        let response = send_raw(
            port,
            "GET /auth/github/callback?code=abc&state=xyz HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        let url = waiter.await.unwrap().unwrap();
        assert_eq!(
            url,
            format!(
                "http://localhost:{}/auth/github/callback?code=abc&state=xyz",
                port
            )
        );
    }

    #[tokio::test]
    async fn test_ignores_other_paths() {
        let listener = OAuthCallbackServer::new(0, 5).listen().await.unwrap();
        let port = listener.port();
        let waiter = tokio::spawn(listener.wait_for_callback());

        let response = send_raw(port, "GET /favicon.ico HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        send_raw(port, "GET /auth/discord/callback?code=1&state=2 HTTP/1.1\r\n\r\n").await;
        let url = waiter.await.unwrap().unwrap();
        assert!(url.contains("/auth/discord/callback"));
    }

    #[tokio::test]
    async fn test_times_out() {
        let listener = OAuthCallbackServer::new(0, 0).listen().await.unwrap();
        let err = listener.wait_for_callback().await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout));
    }
}
