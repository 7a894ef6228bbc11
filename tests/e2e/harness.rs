//! Test harness serving canned HTTP responses.
//!
//! `MockServer` binds a loopback `TcpListener` and answers every request with
//! whatever its handler returns, so the real `reqwest` transports can be
//! exercised without reaching any registry, GitHub or mirror.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request received
    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// HTTP method.
    pub method: String,
    /// Path without query string.
    pub path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    /// Headers, names lowercased.
    pub headers: HashMap<String, String>,
}

impl MockRequest {
    /// Header value by lowercase name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    delay: Duration,
}

impl MockResponse {
    /// Empty response with `status`.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    /// `200 OK` with a JSON body.
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self::status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// Replace the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Wait before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Arc<dyn Fn(&MockRequest) -> MockResponse + Send + Sync>;

/// Loopback HTTP server answering from a handler.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Start a server on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start<F>(handler: F) -> Result<Self>
    where
        F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, handler, recorded).await {
                        debug!("Mock connection ended: {e}");
                    }
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            task,
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests with `method` to `path`.
    #[must_use]
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<MockRequest>>>,
) -> Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HarnessError::Malformed("connection closed before headers".to_string()));
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let request = parse_request(&String::from_utf8_lossy(&buffer))?;
    recorded.lock().push(request.clone());

    let response = handler(&request);
    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut head = format!(
        "HTTP/1.1 {} Mock\r\ncontent-length: {}\r\nconnection: close\r\n",
        response.status,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    if request.method != "HEAD" {
        stream.write_all(response.body.as_bytes()).await?;
    }
    stream.shutdown().await?;
    Ok(())
}

fn parse_request(raw: &str) -> Result<MockRequest> {
    let mut lines = raw.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| HarnessError::Malformed("empty request".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(HarnessError::Malformed(request_line.to_string()));
    };

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Ok(MockRequest {
        method: method.to_string(),
        path,
        query,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line_and_headers() {
        let request = parse_request(
            "HEAD /v2/calico/node/manifests/v1?x=1 HTTP/1.1\r\n\
             Host: 127.0.0.1\r\n\
             Authorization: Bearer t\r\n\r\n",
        )
        .expect("parse");
        assert_eq!(request.method, "HEAD");
        assert_eq!(request.path, "/v2/calico/node/manifests/v1");
        assert_eq!(request.query.as_deref(), Some("x=1"));
        assert_eq!(request.header("authorization"), Some("Bearer t"));
    }
}
