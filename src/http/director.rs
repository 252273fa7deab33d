//! Upstream request rewriting.
//!
//! # Responsibilities
//! - Retarget an inbound request at the upstream origin (scheme,
//!   authority, Host header, path-prefix join)
//! - Strip hop-by-hop headers in both directions
//! - Keep the proxy transparent: `X-Forwarded-For` is forwarded verbatim
//!   when the client sent it and never injected otherwise
//!
//! # Design Decisions
//! - The inbound body is collected up front so every attempt is
//!   replayable; continuation requests rebuild the same head with a
//!   fresh `Range` header

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, CONNECTION, CONTENT_LENGTH, HOST,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, RANGE, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use axum::http::{request, Method, Request, Uri};
use bytes::Bytes;
use http_body_util::Full;
use url::Url;

/// Error type for request rewriting.
#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    #[error("upstream URL has no host")]
    MissingHost,
    #[error("invalid upstream URL component: {0}")]
    InvalidComponent(#[from] InvalidUri),
    #[error("invalid upstream host header: {0}")]
    InvalidHostHeader(#[from] InvalidHeaderValue),
    #[error("failed to assemble upstream URI: {0}")]
    Uri(#[from] axum::http::Error),
}

/// The upstream origin, parsed once at startup.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
    path_prefix: String,
}

impl UpstreamTarget {
    pub fn from_url(url: &Url) -> Result<Self, DirectorError> {
        let host = url.host_str().ok_or(DirectorError::MissingHost)?;
        let authority: Authority = match url.port() {
            Some(port) => format!("{}:{}", host, port).parse()?,
            None => host.parse()?,
        };
        let scheme: Scheme = url.scheme().parse()?;
        let host_header = HeaderValue::from_str(authority.as_str())?;

        Ok(Self {
            scheme,
            authority,
            host_header,
            path_prefix: url.path().to_string(),
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Derive the per-request upstream value from the inbound request.
    pub fn rewrite(
        &self,
        parts: &request::Parts,
        body: Bytes,
    ) -> Result<UpstreamRequest, DirectorError> {
        let path = match parts.uri.path() {
            "" => "/",
            p => p,
        };
        let mut path_and_query = join_paths(&self.path_prefix, path);
        if let Some(query) = parts.uri.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }
        let path_and_query: PathAndQuery = path_and_query.parse()?;

        let uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?;

        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        // Content length is recomputed from the replayable body.
        headers.remove(CONTENT_LENGTH);
        headers.insert(HOST, self.host_header.clone());

        Ok(UpstreamRequest {
            method: parts.method.clone(),
            uri,
            headers,
            body,
        })
    }
}

/// A per-client-request value targeting the upstream. Owned by the one
/// in-flight request; rebuilt into a concrete `Request` per attempt.
#[derive(Debug)]
pub struct UpstreamRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl UpstreamRequest {
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Build the request for the first attempt. Any client `Range`
    /// header is forwarded unchanged.
    pub fn build(&self) -> Request<Full<Bytes>> {
        let mut request = Request::new(Full::new(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }

    /// Build a continuation request with the `Range` header overwritten
    /// to `bytes=start-(end or "")`.
    pub fn build_with_range(&self, start: u64, end: Option<u64>) -> Request<Full<Bytes>> {
        let mut request = self.build();
        request.headers_mut().insert(RANGE, range_header(start, end));
        request
    }
}

/// Format a continuation `Range` header value.
fn range_header(start: u64, end: Option<u64>) -> HeaderValue {
    let value = match end {
        Some(end) => format!("bytes={}-{}", start, end),
        None => format!("bytes={}-", start),
    };
    HeaderValue::from_str(&value).expect("range value is ASCII")
}

/// Headers that are connection-scoped and must not cross the proxy, per
/// RFC 7230 §6.1.
const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Remove hop-by-hop headers: any header named by `Connection` plus the
/// fixed RFC 7230 set. Applied to both the egress request and the
/// client-bound response head.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| token.trim().parse::<HeaderName>().ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn join_paths(prefix: &str, path: &str) -> String {
    match (prefix.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", prefix, &path[1..]),
        (false, false) => format!("{}/{}", prefix, path),
        _ => format!("{}{}", prefix, path),
    }
}
