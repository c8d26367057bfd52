//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use forward_proxy::config::ProxyConfig;
use forward_proxy::net::InFlightTracker;
use forward_proxy::{HttpServer, Shutdown};

/// A canned upstream response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Hold the reply back after the request head arrives.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Raw TCP upstream that records every request head it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    /// `host:port` as the proxy sees it.
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request heads received so far, lowercased.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a mock upstream answering every request with `response`.
pub async fn start_mock_upstream(response: MockResponse) -> MockUpstream {
    start_mock_upstream_with(|_| response).await
}

/// Like `start_mock_upstream`, for responses that mention the upstream's own
/// address.
pub async fn start_mock_upstream_with<F>(build: F) -> MockUpstream
where
    F: FnOnce(SocketAddr) -> MockResponse,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let response = build(addr);
    let delay = response.delay;
    let reply = Arc::new(response.to_bytes());

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let seen = Arc::clone(&seen);
                    let reply = Arc::clone(&reply);
                    tokio::spawn(async move {
                        handle(socket, seen, reply, delay).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, requests }
}

async fn handle(mut socket: TcpStream, seen: Arc<Mutex<Vec<String>>>, reply: Arc<Vec<u8>>, delay: Duration) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    seen.lock()
        .unwrap()
        .push(String::from_utf8_lossy(&head).to_ascii_lowercase());

    tokio::time::sleep(delay).await;
    let _ = socket.write_all(&reply).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Run the proxy on an ephemeral port. Keep the returned `Shutdown` alive
/// for as long as the proxy should run.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _) = start_tracked_proxy(config).await;
    (addr, shutdown)
}

/// Like `start_proxy`, also returning the server's in-flight tracker.
pub async fn start_tracked_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown, InFlightTracker) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let server = HttpServer::new(Arc::new(config)).unwrap();
    let tracker = server.in_flight().clone();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    (addr, shutdown, tracker)
}

/// Client that neither follows redirects nor decompresses.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
