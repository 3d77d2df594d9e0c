//! One-shot loopback listener for browser-based session handoff.
//!
//! Some deployments cannot collect credentials in-process and instead
//! bounce the user through the provider's own web login; the provider then
//! redirects the browser to a loopback URL carrying a session token. This
//! listener accepts exactly one such redirect. It enforces a hard
//! wall-clock ceiling so an abandoned login cannot block the caller
//! indefinitely.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{ClientError, ClientResult};

/// Session token delivered by the loopback redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffToken {
    pub token: String,
    /// Account identifier, when the provider includes one.
    pub account: Option<String>,
}

/// Listens for a single handoff redirect on a loopback port.
pub struct HandoffListener {
    listener: TcpListener,
    addr: SocketAddr,
    ceiling: Duration,
}

impl HandoffListener {
    /// Wall-clock ceiling on the whole wait.
    pub const DEFAULT_CEILING: Duration = Duration::from_secs(30);

    /// Binds the first available loopback port in the given inclusive
    /// range. Port 0 asks the OS for an ephemeral port.
    pub fn bind(port_range: (u16, u16)) -> ClientResult<Self> {
        for port in port_range.0..=port_range.1 {
            match TcpListener::bind(format!("127.0.0.1:{port}")) {
                Ok(listener) => {
                    let addr = listener.local_addr().map_err(|err| {
                        ClientError::transport("loopback listener has no address")
                            .with_source(err)
                    })?;
                    debug!(port = addr.port(), "bound handoff listener");
                    return Ok(Self {
                        listener,
                        addr,
                        ceiling: Self::DEFAULT_CEILING,
                    });
                }
                Err(_) => continue,
            }
        }
        Err(ClientError::transport(format!(
            "no loopback port available in {}..={}",
            port_range.0, port_range.1
        )))
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// The URL the provider should redirect the browser to.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/handoff", self.addr.port())
    }

    /// Blocks until the redirect arrives or the ceiling passes.
    ///
    /// Connections that are not a handoff redirect (favicon probes and the
    /// like) are ignored and the listener keeps waiting. Call this from a
    /// blocking context; in async code wrap it in `spawn_blocking`.
    pub fn wait(self) -> ClientResult<HandoffToken> {
        self.listener.set_nonblocking(false).map_err(|err| {
            ClientError::transport("failed to configure handoff listener").with_source(err)
        })?;

        let ceiling = self.ceiling;
        let (tx, rx) = mpsc::channel();

        // Accept on a separate thread so the wait can time out.
        let _accept = thread::spawn(move || {
            for stream in self.listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = handle_handoff(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(err) => error!(error = %err, "failed to accept handoff connection"),
                }
            }
        });

        match rx.recv_timeout(ceiling) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ClientError::transport(format!(
                "no handoff arrived within {}s",
                ceiling.as_secs()
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ClientError::internal("handoff channel disconnected"))
            }
        }
    }
}

/// Handles one incoming connection. Returns `None` when the request is not
/// a handoff redirect, so the accept loop keeps waiting.
fn handle_handoff(mut stream: TcpStream) -> Option<ClientResult<HandoffToken>> {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return None;
    }

    // Request line: GET /handoff?token=...&account=... HTTP/1.1
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "GET" {
        return None;
    }
    let path = parts[1];
    if !path.starts_with("/handoff") {
        return None;
    }

    let query_start = path.find('?').map(|i| i + 1).unwrap_or(path.len());
    let query = &path[query_start..];

    let mut token = None;
    let mut account = None;
    let mut refusal = None;

    for param in query.split('&') {
        let mut kv = param.splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            match key {
                "token" => {
                    token = Some(urlencoding::decode(value).unwrap_or_default().into_owned())
                }
                "account" => {
                    account = Some(urlencoding::decode(value).unwrap_or_default().into_owned())
                }
                "error" => {
                    refusal = Some(urlencoding::decode(value).unwrap_or_default().into_owned())
                }
                _ => {}
            }
        }
    }

    let response = if refusal.is_some() || token.is_none() {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Sign-in Failed</h1>\
        <p>You can close this window.</p></body></html>"
    } else {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Sign-in Complete</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    if let Some(refusal) = refusal {
        return Some(Err(ClientError::protocol(format!(
            "handoff refused: {refusal}"
        ))));
    }
    match token {
        Some(token) => Some(Ok(HandoffToken { token, account })),
        None => Some(Err(ClientError::protocol(
            "handoff redirect carried no token",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn send_request(addr: SocketAddr, path: &str) {
        let mut stream = TcpStream::connect(addr).unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
        stream.write_all(request.as_bytes()).unwrap();
        let _ = stream.flush();
    }

    #[test]
    fn delivers_the_token() {
        let listener = HandoffListener::bind((0, 0)).unwrap();
        let addr = listener.addr;
        assert!(listener.redirect_uri().ends_with("/handoff"));

        let client = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            send_request(addr, "/handoff?token=tok-abc&account=user%40example.com");
        });

        let handoff = listener.wait().unwrap();
        assert_eq!(handoff.token, "tok-abc");
        assert_eq!(handoff.account.as_deref(), Some("user@example.com"));
        client.join().unwrap();
    }

    #[test]
    fn times_out_at_the_ceiling() {
        let listener = HandoffListener::bind((0, 0))
            .unwrap()
            .with_ceiling(Duration::from_millis(100));

        let started = Instant::now();
        let err = listener.wait().unwrap_err();
        assert!(err.message().contains("no handoff"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn ignores_unrelated_requests() {
        let listener = HandoffListener::bind((0, 0)).unwrap();
        let addr = listener.addr;

        let client = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            send_request(addr, "/favicon.ico");
            thread::sleep(Duration::from_millis(20));
            send_request(addr, "/handoff?token=tok-later");
        });

        let handoff = listener.wait().unwrap();
        assert_eq!(handoff.token, "tok-later");
        assert_eq!(handoff.account, None);
        client.join().unwrap();
    }

    #[test]
    fn surfaces_a_provider_refusal() {
        let listener = HandoffListener::bind((0, 0)).unwrap();
        let addr = listener.addr;

        let client = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            send_request(addr, "/handoff?error=denied");
        });

        let err = listener.wait().unwrap_err();
        assert!(err.message().contains("denied"), "{err}");
        client.join().unwrap();
    }
}
