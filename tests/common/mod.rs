//! Shared utilities for integration testing.
//!
//! `MockUpstream` is a raw-TCP origin that serves a fixed payload with
//! byte-range support, a controllable ETag sequence, and scheduled
//! connection drops at absolute payload offsets. Dropping the socket
//! mid-body with a declared content length is how a flaky origin looks
//! to the proxy's upstream client.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use resume_proxy::config::ProxyConfig;
use resume_proxy::http::ProxyServer;
use resume_proxy::lifecycle::Shutdown;
use resume_proxy::net::Listener;

const WRITE_CHUNK: usize = 4096;

/// One request as seen by the origin.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub range: Option<String>,
    pub forwarded_for: Option<String>,
}

#[derive(Clone)]
pub struct MockUpstream {
    addr: SocketAddr,
    payload: Arc<Vec<u8>>,
    etags: Arc<Mutex<Vec<String>>>,
    drops: Arc<Mutex<VecDeque<u64>>>,
    responses: Arc<Mutex<usize>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    /// Bind an ephemeral port and start serving the payload.
    pub async fn start(payload: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mock = Self {
            addr,
            payload: Arc::new(payload),
            etags: Arc::new(Mutex::new(vec!["\"v1\"".to_string()])),
            drops: Arc::new(Mutex::new(VecDeque::new())),
            responses: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let server = mock.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            server.handle(socket).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        mock
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Cut the connection once the byte at this absolute payload offset
    /// would be sent. Each scheduled drop fires once.
    pub fn schedule_drop(&self, offset: u64) {
        self.drops.lock().unwrap().push_back(offset);
    }

    /// Append an ETag to the per-response sequence; the last entry
    /// repeats for all later responses.
    pub fn push_etag(&self, tag: &str) {
        self.etags.lock().unwrap().push(tag.to_string());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn handle(&self, mut socket: TcpStream) {
        let Some(request) = read_head(&mut socket).await else {
            return;
        };
        self.requests.lock().unwrap().push(request.clone());

        if request.path == "/missing" {
            let _ = socket
                .write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
                )
                .await;
            let _ = socket.shutdown().await;
            return;
        }

        let total = self.payload.len() as u64;
        let (status, start, end) = match parse_range(request.range.as_deref(), total) {
            Some((start, end)) => ("206 Partial Content", start, end),
            None => ("200 OK", 0, total.saturating_sub(1)),
        };
        let length = end - start + 1;

        let etag = {
            let mut responses = self.responses.lock().unwrap();
            let etags = self.etags.lock().unwrap();
            let index = (*responses).min(etags.len() - 1);
            *responses += 1;
            etags[index].clone()
        };

        // Fire at most one scheduled drop that falls inside this range.
        let cut: Option<u64> = {
            let mut drops = self.drops.lock().unwrap();
            let found = drops
                .iter()
                .enumerate()
                .filter(|(_, &offset)| offset > start && offset <= end)
                .min_by_key(|(_, &offset)| offset)
                .map(|(i, &offset)| (i, offset));
            found.map(|(i, offset)| {
                drops.remove(i);
                offset
            })
        };

        let mut head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nEtag: {}\r\nConnection: close\r\n",
            status, length, etag
        );
        if status.starts_with("206") {
            head.push_str(&format!("Content-Range: bytes {}-{}/{}\r\n", start, end, total));
        }
        head.push_str("\r\n");
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }

        let stop = cut.unwrap_or(end + 1);
        let mut position = start;
        while position < stop {
            let chunk_end = (position + WRITE_CHUNK as u64).min(stop);
            let chunk = &self.payload[position as usize..chunk_end as usize];
            if socket.write_all(chunk).await.is_err() {
                return;
            }
            position = chunk_end;
        }
        let _ = socket.flush().await;
        // Dropping the socket here closes the connection; when a cut was
        // scheduled the declared content length has not been satisfied.
        let _ = socket.shutdown().await;
    }
}

/// Read and minimally parse an HTTP/1.1 request head.
async fn read_head(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::with_capacity(1024);
    let mut byte = [0u8; 1024];
    loop {
        let n = socket.read(&mut byte).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&byte[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buffer.len() > 64 * 1024 {
            return None;
        }
    }
    let head = String::from_utf8_lossy(&buffer);
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let path = request_line.split(' ').nth(1)?.to_string();

    let mut range = None;
    let mut forwarded_for = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.to_ascii_lowercase().as_str() {
            "range" => range = Some(value.trim().to_string()),
            "x-forwarded-for" => forwarded_for = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Some(RecordedRequest {
        path,
        range,
        forwarded_for,
    })
}

/// Parse `bytes=S-[E]`, returning the inclusive range to serve.
fn parse_range(raw: Option<&str>, total: u64) -> Option<(u64, u64)> {
    let spec = raw?.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = match end {
        "" => total.saturating_sub(1),
        e => e.parse::<u64>().ok()?.min(total.saturating_sub(1)),
    };
    (start <= end).then_some((start, end))
}

/// Deterministic pseudo-random payload.
pub fn make_payload(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Start the proxy on an ephemeral port in front of the given upstream.
pub async fn start_proxy(upstream_url: &str) -> (String, Shutdown) {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.upstream.url = upstream_url.to_string();
    // Keep test backoff short.
    config.retries.initial_interval_ms = 10;

    let server = ProxyServer::new(&config).unwrap();
    let shutdown = server.shutdown_handle();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    (format!("http://{}", addr), shutdown)
}
