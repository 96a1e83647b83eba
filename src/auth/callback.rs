//! Loopback listener for the OIDC redirect
//!
//! The redirect URI points at `http://localhost:<port>/`. After the hosted UI
//! signs the user in, the browser lands here with `?code=...&state=...`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Parameters delivered to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Connection: close\r\n\r\n\
<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Filegate - Signed in</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 80px\">\
<h1>Signed in</h1><p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Connection: close\r\n\r\n\
<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Filegate - Sign-in failed</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 80px\">\
<h1>Sign-in failed</h1><p>Return to the terminal for details.</p></body></html>";

const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Bind the callback listener on a specific port (0 = ephemeral).
/// Returns the listener and the actual port assigned by the OS.
pub async fn bind_callback_listener(port: u16) -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| ClientError::Auth(format!("Failed to bind callback server on port {}: {}", port, e)))?;

    let actual_port = listener
        .local_addr()
        .map(|a| a.port())
        .map_err(|e| ClientError::Auth(format!("Failed to get local port: {}", e)))?;

    info!("OIDC callback listener bound on port {}", actual_port);
    Ok((listener, actual_port))
}

/// Wait for the redirect on an already-bound listener.
///
/// Requests that carry neither a code nor an error (favicon, preconnects)
/// get a 404 and the wait continues.
pub async fn wait_for_callback(listener: TcpListener) -> Result<CallbackParams> {
    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .map_err(|e| ClientError::Auth(format!("Failed to accept connection: {}", e)))?;

        let request = read_request_head(&mut socket).await?;
        if request.is_empty() {
            continue;
        }

        match parse_callback_request(&request) {
            Ok(Some(params)) => {
                respond(&mut socket, SUCCESS_PAGE).await;
                return Ok(params);
            }
            Ok(None) => {
                debug!("Ignoring non-callback request: {}", request.lines().next().unwrap_or(""));
                respond(&mut socket, NOT_FOUND).await;
            }
            Err(e) => {
                respond(&mut socket, FAILURE_PAGE).await;
                return Err(e);
            }
        }
    }
}

async fn read_request_head(socket: &mut TcpStream) -> Result<String> {
    let mut buffer = vec![0u8; 8192];
    let n = socket
        .read(&mut buffer)
        .await
        .map_err(|e| ClientError::Auth(format!("Failed to read request: {}", e)))?;
    Ok(String::from_utf8_lossy(&buffer[..n]).to_string())
}

async fn respond(socket: &mut TcpStream, response: &str) {
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        debug!("Failed to send callback response: {}", e);
    }
    let _ = socket.shutdown().await;
}

/// Extract `code` and `state` from the request line.
///
/// `Ok(None)` means the request is not a callback at all.
pub fn parse_callback_request(request: &str) -> Result<Option<CallbackParams>> {
    let first_line = match request.lines().next() {
        Some(line) => line,
        None => return Ok(None),
    };

    // GET /?code=xxx&state=yyy HTTP/1.1
    let target = match first_line.split_whitespace().nth(1) {
        Some(target) => target,
        None => return Ok(None),
    };
    let query = match target.split_once('?') {
        Some((_, query)) => query,
        None => return Ok(None),
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;

    for param in query.split('&') {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        let value = decode_component(value);
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            "error_description" => error_description = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(ClientError::Auth(match error_description {
            Some(desc) if !desc.is_empty() => format!("{}: {}", error, desc),
            _ => error,
        }));
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(Some(CallbackParams { code, state })),
        (Some(_), None) => Err(ClientError::Auth("Missing state".to_string())),
        _ => Ok(None),
    }
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|v| v.into_owned())
        .unwrap_or(spaced)
}
