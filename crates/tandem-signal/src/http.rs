//! Plain HTTP endpoints served on the signaling port
//!
//! The listener accepts both WebSocket upgrades and ordinary requests. This
//! module inspects the request head to tell them apart and answers the
//! ordinary ones: liveness, health counters, and the two entry pages.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

use tandem_core::RelayError;

use crate::router::SignalRouter;

/// Initial peek buffer; doubled while a head keeps filling it
const INITIAL_HEAD_BYTES: usize = 4096;

/// Largest request head we accept. Longer heads get 431 and are never upgraded.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Attempts to see a complete request head before deciding with what we have
const HEAD_PEEK_ATTEMPTS: usize = 50;
const HEAD_PEEK_INTERVAL: Duration = Duration::from_millis(10);

/// A fully buffered HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into().into_bytes(),
        }
    }

    fn html(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            404 => "Not Found",
            405 => "Method Not Allowed",
            431 => "Request Header Fields Too Large",
            _ => "Internal Server Error",
        }
    }

    /// Serialize status line, headers, and body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Peek at the start of the stream without consuming it.
///
/// The buffer grows up to [`MAX_HEAD_BYTES`] so headers after a long cookie
/// are still seen. Returns once the head terminator has arrived, the limit is
/// reached, the peer closed, or the retry budget ran out.
pub async fn peek_head(stream: &TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; INITIAL_HEAD_BYTES];
    let mut n = 0;
    let mut attempts = 0;

    while attempts < HEAD_PEEK_ATTEMPTS {
        n = stream.peek(&mut buf).await?;
        if n == 0 || find_head_end(&buf[..n]).is_some() {
            break;
        }
        if n == buf.len() {
            if buf.len() >= MAX_HEAD_BYTES {
                break;
            }
            buf.resize((buf.len() * 2).min(MAX_HEAD_BYTES), 0);
            continue;
        }
        attempts += 1;
        tokio::time::sleep(HEAD_PEEK_INTERVAL).await;
    }

    buf.truncate(n);
    Ok(buf)
}

/// Whether a peeked head hit the size limit without terminating
pub fn head_too_large(head: &[u8]) -> bool {
    head.len() >= MAX_HEAD_BYTES && find_head_end(head).is_none()
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Whether a request head asks for a WebSocket upgrade
pub fn is_websocket_upgrade(head: &[u8]) -> bool {
    let head = match find_head_end(head) {
        Some(end) => &head[..end],
        None => head,
    };
    let head = String::from_utf8_lossy(head);
    head.lines().skip(1).any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value.trim().eq_ignore_ascii_case("websocket")
        })
    })
}

/// Method and path (query string stripped) of a request head
pub fn parse_request_line(head: &[u8]) -> Option<(String, String)> {
    let head = String::from_utf8_lossy(head);
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or("/").to_string();
    Some((method, path))
}

/// Produce the response for one request
pub async fn route(method: &str, path: &str, router: &SignalRouter, public_dir: &Path) -> HttpResponse {
    if method != "GET" {
        return HttpResponse::json(405, r#"{"error":"method not allowed"}"#);
    }

    match path {
        "/ping" => HttpResponse::json(200, r#"{"status":"pong"}"#),
        "/health" => {
            let stats = router.stats();
            HttpResponse::json(
                200,
                format!(
                    r#"{{"status":"healthy","connections":{},"publishers":{}}}"#,
                    stats.connections, stats.publishers
                ),
            )
        }
        "/stream" => serve_page(public_dir, "stream.html").await,
        "/watch" => serve_page(public_dir, "watch.html").await,
        _ => HttpResponse::json(404, r#"{"error":"not found"}"#),
    }
}

async fn serve_page(public_dir: &Path, name: &str) -> HttpResponse {
    match tokio::fs::read(public_dir.join(name)).await {
        Ok(body) => HttpResponse::html(body),
        Err(_) => HttpResponse::json(404, r#"{"error":"page not found"}"#),
    }
}

/// Answer a plain HTTP request and log it
pub async fn handle_http_request(
    stream: &mut TcpStream,
    head: &[u8],
    router: &SignalRouter,
    public_dir: &Path,
) -> Result<(), RelayError> {
    let started = Instant::now();

    // Consume what was peeked; the body of a GET is ignored
    let mut buf = vec![0u8; head.len()];
    stream.read_exact(&mut buf).await?;

    let (method, path) =
        parse_request_line(head).unwrap_or_else(|| ("GET".to_string(), "/".to_string()));
    let response = if head_too_large(head) {
        HttpResponse::json(431, r#"{"error":"request head too large"}"#)
    } else {
        route(&method, &path, router, public_dir).await
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;

    info!(
        "{} {} {} {:.1}ms",
        method,
        path,
        response.status,
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Connected client/server pair over loopback
    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    const UPGRADE_HEAD: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost:8000\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_detect_websocket_upgrade() {
        assert!(is_websocket_upgrade(UPGRADE_HEAD));
        assert!(is_websocket_upgrade(b"GET / HTTP/1.1\r\nupgrade:  WebSocket\r\n\r\n"));
        assert!(!is_websocket_upgrade(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n"));
        // The request line alone never counts
        assert!(!is_websocket_upgrade(b"GET /Upgrade:websocket HTTP/1.1\r\n\r\n"));
    }

    #[test]
    fn test_parse_request_line() {
        assert_eq!(
            parse_request_line(b"GET /watch?room=1 HTTP/1.1\r\n\r\n"),
            Some(("GET".to_string(), "/watch".to_string()))
        );
        assert_eq!(parse_request_line(b""), None);
        assert_eq!(parse_request_line(b"GET\r\n"), None);
    }

    #[test]
    fn test_response_bytes() {
        let response = HttpResponse::json(200, r#"{"status":"pong"}"#);
        let text = String::from_utf8(response.to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 17\r\n"));
        assert!(text.ends_with(r#"{"status":"pong"}"#));
    }

    #[tokio::test]
    async fn test_route_endpoints() {
        let router = SignalRouter::default();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stream.html"), "<h1>stream</h1>").unwrap();

        let ping = route("GET", "/ping", &router, dir.path()).await;
        assert_eq!(ping.status, 200);
        assert_eq!(ping.body, br#"{"status":"pong"}"#.to_vec());

        let health = route("GET", "/health", &router, dir.path()).await;
        assert_eq!(
            String::from_utf8(health.body).unwrap(),
            r#"{"status":"healthy","connections":0,"publishers":0}"#
        );

        let stream = route("GET", "/stream", &router, dir.path()).await;
        assert_eq!(stream.status, 200);
        assert_eq!(stream.content_type, "text/html; charset=utf-8");
        assert_eq!(stream.body, b"<h1>stream</h1>".to_vec());

        // watch.html was not written
        assert_eq!(route("GET", "/watch", &router, dir.path()).await.status, 404);
        assert_eq!(route("GET", "/admin", &router, dir.path()).await.status, 404);
        assert_eq!(route("POST", "/ping", &router, dir.path()).await.status, 405);
    }

    #[tokio::test]
    async fn test_upgrade_header_after_long_cookie() {
        let (mut client, server) = tcp_pair().await;
        let head = format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\nCookie: session={}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n",
            "c".repeat(6 * 1024)
        );
        client.write_all(head.as_bytes()).await.unwrap();

        let peeked = peek_head(&server).await.unwrap();
        assert_eq!(peeked.len(), head.len());
        assert!(is_websocket_upgrade(&peeked));
        assert!(!head_too_large(&peeked));
    }

    #[test]
    fn test_head_too_large() {
        let unterminated = vec![b'a'; MAX_HEAD_BYTES];
        assert!(head_too_large(&unterminated));
        assert!(!head_too_large(&unterminated[..MAX_HEAD_BYTES - 1]));

        let mut terminated = unterminated.clone();
        terminated[MAX_HEAD_BYTES - 4..].copy_from_slice(b"\r\n\r\n");
        assert!(!head_too_large(&terminated));
    }

    #[tokio::test]
    async fn test_oversized_head_answered_with_431() {
        let (mut client, mut server) = tcp_pair().await;
        let mut head = b"GET /ping HTTP/1.1\r\nX-Pad: ".to_vec();
        head.resize(MAX_HEAD_BYTES, b'p');
        client.write_all(&head).await.unwrap();

        let router = SignalRouter::default();
        let peeked = peek_head(&server).await.unwrap();
        assert_eq!(peeked.len(), MAX_HEAD_BYTES);
        handle_http_request(&mut server, &peeked, &router, Path::new("public"))
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 431 Request Header Fields Too Large\r\n"));
    }
}
