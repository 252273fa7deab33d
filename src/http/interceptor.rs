//! Client-bound response accounting.
//!
//! # Responsibilities
//! - Carry the status code and header snapshot of the first upstream
//!   response (frozen once the body starts flowing)
//! - Feed body bytes to the client through a bounded channel
//! - Count bytes accepted for delivery; the count is the sole input to
//!   continuation-range arithmetic
//! - Detect client departure (the receiving half is dropped)
//!
//! # Design Decisions
//! - No body byte is ever buffered beyond the channel bound; `bytes_written`
//!   is the only state resumption needs
//! - A byte is counted only once it is accepted by the channel, so every
//!   counted byte is either delivered or the client is already gone
//! - Writes past the declared content length are refused; an upstream
//!   that keeps producing past the promised length is a fatal condition

use axum::http::header::{HeaderName, CONTENT_LENGTH};
use axum::http::{HeaderMap, StatusCode};
use axum::BoxError;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Failure modes of a sink write.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The client went away; the receiving half of the channel is gone.
    #[error("client connection closed")]
    Closed,
    /// The write would exceed the content length declared to the client.
    #[error("write exceeds declared content length")]
    ContentLength,
}

/// Snapshot of the first upstream response as shown to the client.
///
/// Fixed when the first response head arrives (502 is synthesized when
/// no head was ever received) and never re-sent: resumption appends body
/// bytes under the already-delivered status line and headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    /// Head for a request that never produced an upstream response.
    pub fn bad_gateway() -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            headers: HeaderMap::new(),
        }
    }

    /// The content length promised to the client, if any.
    pub fn declared_len(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// A header value from the snapshot, as a string.
    pub fn header_str(&self, name: HeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// The write side of the client-bound body stream.
pub struct ResponseSink {
    tx: mpsc::Sender<Result<Bytes, BoxError>>,
    bytes_written: u64,
    declared_len: Option<u64>,
}

impl ResponseSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, BoxError>>, declared_len: Option<u64>) -> Self {
        Self {
            tx,
            bytes_written: 0,
            declared_len,
        }
    }

    /// Total bytes accepted for delivery to the client.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Queue one chunk for the client. Counts the bytes only on success.
    pub async fn write(&mut self, data: Bytes) -> Result<(), WriteError> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as u64;
        if let Some(limit) = self.declared_len {
            if self.bytes_written + len > limit {
                return Err(WriteError::ContentLength);
            }
        }
        self.tx
            .send(Ok(data))
            .await
            .map_err(|_| WriteError::Closed)?;
        self.bytes_written += len;
        Ok(())
    }

    /// Whether the client has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Sleep for `interval`, waking early if the client goes away.
    /// Returns false when woken by client departure.
    pub async fn sleep_unless_closed(&self, interval: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(interval) => true,
            _ = self.tx.closed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_counts_bytes() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = ResponseSink::new(tx, None);

        sink.write(Bytes::from_static(b"hello")).await.unwrap();
        sink.write(Bytes::from_static(b"")).await.unwrap();
        sink.write(Bytes::from_static(b"world")).await.unwrap();

        assert_eq!(sink.bytes_written(), 10);
        assert_eq!(rx.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn test_write_after_receiver_drop_is_closed() {
        let (tx, rx) = mpsc::channel(4);
        let mut sink = ResponseSink::new(tx, None);
        drop(rx);

        let err = sink.write(Bytes::from_static(b"late")).await.unwrap_err();
        assert!(matches!(err, WriteError::Closed));
        assert_eq!(sink.bytes_written(), 0);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_write_past_declared_length_is_refused() {
        let (tx, _rx) = mpsc::channel(4);
        let mut sink = ResponseSink::new(tx, Some(6));

        sink.write(Bytes::from_static(b"sixby!")).await.unwrap();
        let err = sink.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, WriteError::ContentLength));
        assert_eq!(sink.bytes_written(), 6);
    }

    #[tokio::test]
    async fn test_sleep_wakes_on_client_departure() {
        let (tx, rx) = mpsc::channel::<Result<Bytes, BoxError>>(4);
        let sink = ResponseSink::new(tx, None);
        drop(rx);

        let slept = sink
            .sleep_unless_closed(std::time::Duration::from_secs(30))
            .await;
        assert!(!slept);
    }

    #[test]
    fn test_head_declared_len() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "1234".parse().unwrap());
        let head = ResponseHead::new(StatusCode::OK, headers);

        assert_eq!(head.declared_len(), Some(1234));
        assert_eq!(ResponseHead::bad_gateway().declared_len(), None);
    }
}
