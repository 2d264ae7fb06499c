//! Loopback redirect listener for the browser login flow.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::interrupt;

/// Path the identity provider redirects to after login.
pub const CALLBACK_PATH: &str = "/callback";

/// How long to wait for the browser redirect.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// A bound loopback listener waiting for one authorization redirect.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Binds `127.0.0.1:<port>`. Port 0 lets the OS pick one.
    ///
    /// # Errors
    /// Returns an error if the port is unavailable.
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .with_context(|| format!("Failed to bind login callback on port {port}"))?;
        listener
            .set_nonblocking(true)
            .context("Failed to configure login callback listener")?;
        let port = listener
            .local_addr()
            .context("Failed to read callback listener address")?
            .port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register in the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.port)
    }

    /// Blocks until a redirect carrying `expected_state` arrives.
    ///
    /// Returns `None` on timeout, on Ctrl+C, or when the redirect carries no
    /// code (e.g. the user denied access).
    pub fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Option<String> {
        let start = Instant::now();
        loop {
            match self.listener.accept() {
                Ok((mut stream, _)) => {
                    let _ = stream.set_nonblocking(false);
                    let mut buffer = [0u8; 4096];
                    let read = stream.read(&mut buffer).unwrap_or(0);
                    let request = String::from_utf8_lossy(&buffer[..read]);
                    if !is_callback_request(&request) {
                        // Browsers also ask for /favicon.ico; keep waiting.
                        let _ = stream.write_all(not_found_response().as_bytes());
                        continue;
                    }
                    let code = extract_code_from_request(&request, expected_state);
                    let response = match code.is_some() {
                        true => success_response(),
                        false => error_response(),
                    };
                    let _ = stream.write_all(response.as_bytes());
                    return code;
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout || interrupt::is_interrupted() {
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "login callback listener failed");
                    return None;
                }
            }
        }
    }
}

fn request_url(request: &str) -> Option<url::Url> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;
    url::Url::parse(&format!("http://localhost{path}")).ok()
}

fn is_callback_request(request: &str) -> bool {
    request_url(request).is_some_and(|url| url.path() == CALLBACK_PATH)
}

/// Extracts the authorization code from a raw HTTP request, checking `state`.
pub fn extract_code_from_request(request: &str, expected_state: &str) -> Option<String> {
    let url = request_url(request)?;
    if url.path() != CALLBACK_PATH {
        return None;
    }
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())?;
    if state != expected_state {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
}

/// Parses a pasted redirect URL, query string, or bare code.
///
/// Returns `(code, state)`.
pub fn parse_authorization_input(input: &str) -> (Option<String>, Option<String>) {
    let value = input.trim();
    if value.is_empty() {
        return (None, None);
    }

    if let Ok(url) = url::Url::parse(value) {
        let code = url.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v);
        return (code.map(|v| v.to_string()), state.map(|v| v.to_string()));
    }

    if value.contains("code=") {
        let params = url::form_urlencoded::parse(value.trim_start_matches('?').as_bytes())
            .collect::<Vec<_>>();
        let code = params.iter().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = params.iter().find(|(k, _)| k == "state").map(|(_, v)| v);
        return (
            code.map(std::string::ToString::to_string),
            state.map(std::string::ToString::to_string),
        );
    }

    (Some(value.to_string()), None)
}

fn success_response() -> String {
    let body = "<!doctype html><html><head><meta charset=\"utf-8\" /><title>Signed in</title></head><body><p>Signed in to Campus. Return to your terminal to continue.</p></body></html>";
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn error_response() -> String {
    let body = "Sign-in failed or was cancelled. Return to your terminal.";
    format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn not_found_response() -> String {
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
}
