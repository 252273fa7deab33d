//! Mid-response resumption.
//!
//! # Data Flow
//! ```text
//! serve_resumable()
//!     → first attempt head (transport.rs, panic-guarded)
//!     → response returned to the client, body fed by a pump task:
//!         Attempt0: copy upstream body → sink
//!         Decide:   eligible? parse client range
//!         Resuming: continuation request (probe client)
//!                   → status / ETag checks → copy body → sink
//!                   → classify failure → backoff → loop
//! ```
//!
//! # Design Decisions
//! - Continuation offsets derive solely from the sink's byte count; the
//!   client sees one logical response stitched from many attempts
//! - ETag continuity: every forwarded byte originates from one immutable
//!   resource version
//! - Sustained forward progress refunds the retry budget, so long
//!   streams that drop late cannot exhaust it
//! - A gateway-class (>= 502) first status still attempts resumption,
//!   best effort, appending under the already-sent status line

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, ETAG, RANGE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::BoxError;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::http::director::{strip_hop_by_hop, UpstreamRequest};
use crate::http::interceptor::{ResponseHead, ResponseSink, WriteError};
use crate::http::recover::catch_panic;
use crate::http::server::AppState;
use crate::http::transport::ProbeClient;
use crate::resilience::{RetryPolicy, RetryState};

/// Forward progress that refunds the retry budget.
const PROGRESS_THRESHOLD: u64 = 100 * 1024;

/// Chunks in flight between the pump task and the client connection.
const CHANNEL_CAPACITY: usize = 8;

/// Failure modes of one continuation attempt.
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("continuation request failed: {0}")]
    Transport(#[source] hyper_util::client::legacy::Error),
    #[error("got bad continuation status {0}")]
    BadStatus(StatusCode),
    #[error("response exceeded declared content length")]
    ContentLength,
    #[error("client went away")]
    Canceled,
    #[error("upstream body ended unexpectedly: {0}")]
    UnexpectedEof(#[source] hyper::Error),
    #[error("upstream body read failed: {0}")]
    Body(#[source] hyper::Error),
}

/// The client's originally requested byte range. `end` is inclusive;
/// `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ClientRange {
    const UNBOUNDED: ClientRange = ClientRange {
        start: 0,
        end: None,
    };
}

#[derive(Debug, thiserror::Error)]
#[error("malformed range header '{0}'")]
pub struct RangeParseError(String);

/// Parse a client `Range: bytes=S-[E]` header. Absent or empty means
/// the whole resource. Anything but a single `S-[E]` pair of integers
/// is malformed.
pub fn parse_client_range(raw: Option<&str>) -> Result<ClientRange, RangeParseError> {
    let Some(raw) = raw else {
        return Ok(ClientRange::UNBOUNDED);
    };
    if raw.is_empty() {
        return Ok(ClientRange::UNBOUNDED);
    }
    let spec = raw.strip_prefix("bytes=").unwrap_or(raw);
    let mut parts = spec.splitn(3, '-');
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(RangeParseError(raw.to_string()));
    };
    let start: u64 = start
        .parse()
        .map_err(|_| RangeParseError(raw.to_string()))?;
    let end: Option<u64> = if end.is_empty() {
        None
    } else {
        Some(end.parse().map_err(|_| RangeParseError(raw.to_string()))?)
    };
    Ok(ClientRange { start, end })
}

/// Proxy one client request, stitching the response across upstream
/// attempts when needed.
///
/// Returns as soon as the first attempt's head is known; the body
/// streams from a spawned pump task that owns all resumption state.
pub async fn serve_resumable(
    state: AppState,
    request: Request<Body>,
) -> Result<Response, BoxError> {
    let (parts, body) = request.into_parts();
    let raw_range = parts
        .headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = body.collect().await?.to_bytes();
    let upstream = state.target.rewrite(&parts, body)?;

    let (head, initial_body) = match catch_panic(state.streaming.round_trip(&upstream)).await {
        Ok(Ok(response)) => {
            let (parts, body) = response.into_parts();
            let mut headers = parts.headers;
            strip_hop_by_hop(&mut headers);
            (ResponseHead::new(parts.status, headers), Some(body))
        }
        Ok(Err(error)) => {
            tracing::warn!(url = %upstream.uri(), error = %error, "upstream round trip failed");
            (ResponseHead::bad_gateway(), None)
        }
        Err(panic) => {
            tracing::warn!(url = %upstream.uri(), error = %panic, "first attempt panicked");
            (ResponseHead::bad_gateway(), None)
        }
    };

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let sink = ResponseSink::new(tx, head.declared_len());
    let controller = Resumption {
        head: head.clone(),
        raw_range,
        upstream,
        probe: state.probe.clone(),
        policy: state.policy,
    };
    tokio::spawn(controller.run(sink, initial_body));

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    Ok(response)
}

/// How the first attempt's body copy ended.
enum Attempt0 {
    Clean,
    Canceled,
    Aborted(BoxError),
}

/// Per-request resumption state machine, run on the pump task.
struct Resumption {
    head: ResponseHead,
    raw_range: Option<String>,
    upstream: UpstreamRequest,
    probe: ProbeClient,
    policy: RetryPolicy,
}

enum Flow {
    Complete,
    GaveUp,
}

impl Resumption {
    async fn run(self, mut sink: ResponseSink, initial_body: Option<Incoming>) {
        // Attempt0: stream the first response's body. A panic while
        // copying is an abort, like any mid-body failure.
        let attempt0 = match initial_body {
            Some(body) => match catch_panic(copy_body(body, &mut sink)).await {
                Ok(Ok(())) => Attempt0::Clean,
                Ok(Err(ResumeError::Canceled)) => Attempt0::Canceled,
                Ok(Err(error)) => Attempt0::Aborted(Box::new(error)),
                Err(panic) => Attempt0::Aborted(Box::new(panic)),
            },
            None => Attempt0::Clean,
        };

        // Decide.
        let status = self.head.status.as_u16();
        match &attempt0 {
            Attempt0::Canceled => return,
            Attempt0::Clean if status < 502 => return,
            _ => {}
        }
        if sink.is_closed() {
            return;
        }
        if let Attempt0::Aborted(error) = &attempt0 {
            tracing::warn!(url = %self.upstream.uri(), error = %error, "got abort error");
        }
        if status >= 502 {
            tracing::warn!(status, url = %self.upstream.uri(), "got gateway-class status");
        }

        let first_etag = self.head.header_str(ETAG).to_string();
        let ranges_supported =
            !self.head.header_str(ACCEPT_RANGES).is_empty() && !first_etag.is_empty();
        if !ranges_supported && status < 502 {
            return;
        }

        let range = match parse_client_range(self.raw_range.as_deref()) {
            Ok(range) => range,
            Err(error) => {
                tracing::warn!(url = %self.upstream.uri(), error = %error, "failed to parse client range");
                return;
            }
        };

        // Resuming loop.
        let mut retry = RetryState::new(&self.policy);
        let mut watermark: u64 = 0;
        loop {
            if let Some(end) = range.end {
                if range.start + sink.bytes_written() > end {
                    tracing::warn!(
                        offset = range.start + sink.bytes_written(),
                        end,
                        url = %self.upstream.uri(),
                        "already delivered past requested range end"
                    );
                    break;
                }
            }

            let result = self.finalize(&range, &first_etag, &mut sink).await;

            if sink.bytes_written() > watermark + PROGRESS_THRESHOLD
                && matches!(&result, Err(ResumeError::UnexpectedEof(_)))
            {
                retry.reset(&self.policy);
                watermark = sink.bytes_written();
            }

            match result {
                Ok(Flow::Complete) | Ok(Flow::GaveUp) => break,
                Err(ResumeError::ContentLength) => {
                    tracing::warn!(url = %self.upstream.uri(), "got content length error");
                    break;
                }
                Err(ResumeError::Canceled) => break,
                Err(error) if !retry.exhausted(&self.policy) => {
                    tracing::warn!(error = %error, "continuation attempt failed");
                    tracing::info!(
                        delay_ms = retry.interval().as_millis() as u64,
                        url = %self.upstream.uri(),
                        "retrying after backoff"
                    );
                    if !sink.sleep_unless_closed(retry.interval()).await {
                        break;
                    }
                    retry.bump();
                }
                Err(error) => {
                    tracing::warn!(error = %error, url = %self.upstream.uri(), "continuation retries exhausted");
                    break;
                }
            }
        }
    }

    /// One continuation attempt: request the remaining range, validate
    /// continuity, append the body.
    async fn finalize(
        &self,
        range: &ClientRange,
        first_etag: &str,
        sink: &mut ResponseSink,
    ) -> Result<Flow, ResumeError> {
        let offset = range.start + sink.bytes_written();
        let request = self.upstream.build_with_range(offset, range.end);

        let response = self
            .probe
            .request(request)
            .await
            .map_err(ResumeError::Transport)?;
        let status = response.status();

        if status.as_u16() >= 500 {
            return Err(ResumeError::BadStatus(status));
        }
        if status.as_u16() >= 300 {
            tracing::warn!(
                status = status.as_u16(),
                url = %self.upstream.uri(),
                "got non-success continuation status, giving up"
            );
            return Ok(Flow::GaveUp);
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if etag.is_empty() || (!first_etag.is_empty() && etag != first_etag) {
            tracing::warn!(
                old = first_etag,
                new = etag,
                url = %self.upstream.uri(),
                "etag changed, abandoning resumption"
            );
            return Ok(Flow::GaveUp);
        }

        copy_body(response.into_body(), sink).await?;
        Ok(Flow::Complete)
    }
}

/// Copy an upstream body into the sink frame by frame.
async fn copy_body(mut body: Incoming, sink: &mut ResponseSink) -> Result<(), ResumeError> {
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    sink.write(data).await.map_err(|error| match error {
                        WriteError::Closed => ResumeError::Canceled,
                        WriteError::ContentLength => ResumeError::ContentLength,
                    })?;
                }
            }
            Err(error) => return Err(classify_body_error(error)),
        }
    }
    Ok(())
}

/// Split body-read failures into the truncation class (eligible for the
/// progress-based budget refund) and everything else.
fn classify_body_error(error: hyper::Error) -> ResumeError {
    if error.is_incomplete_message() || chain_has_unexpected_eof(&error) {
        ResumeError::UnexpectedEof(error)
    } else {
        ResumeError::Body(error)
    }
}

fn chain_has_unexpected_eof(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
