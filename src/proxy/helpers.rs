//! Proxy utility functions.
//!
//! This module contains helper functions for request processing:
//! - Lexical path cleaning
//! - Header allow-listing
//! - Raw request dumps for log excerpts
//! - Outbound request construction

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Request, Response, Uri};
use http_body_util::Full;
use url::Url;

use crate::constants::FORWARDED_HEADERS;
use crate::endpoint::ResolvedTarget;
use crate::error::ProxyError;

/// Lexically clean a URL path.
///
/// Collapses repeated slashes, drops `.` segments, resolves `..` against the
/// preceding segment and removes any trailing slash. The result is always
/// rooted; `..` above the root is discarded.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Copy the allow-listed headers from the inbound request.
///
/// Only the first value of each header is forwarded.
pub fn copy_forwarded_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for name in FORWARDED_HEADERS {
        if let Some(value) = src.get(name) {
            dst.insert(HeaderName::from_static(name), value.clone());
        }
    }
}

/// Textual dump of the inbound request: request line, headers, blank line,
/// body.
pub fn dump_request(parts: &Parts, body: &[u8]) -> String {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut dump = format!("{} {} {:?}\r\n", parts.method, target, parts.version);
    for (name, value) in parts.headers.iter() {
        dump.push_str(name.as_str());
        dump.push_str(": ");
        dump.push_str(&String::from_utf8_lossy(value.as_bytes()));
        dump.push_str("\r\n");
    }
    dump.push_str("\r\n");
    dump.push_str(&String::from_utf8_lossy(body));
    dump
}

/// Path and query as sent to the backend
pub fn outbound_request_uri(uri: &Uri) -> String {
    let path = clean_path(uri.path());
    match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    }
}

/// Build the backend request from the inbound parts.
///
/// Scheme and host come from `target`, the path is cleaned, the query is kept.
/// Method and body pass through; headers are limited to the allow-list.
///
/// The URI is normalized through `url::Url`, the same parser the HTTP client
/// applies before sending, so the path that gets signed is the path on the
/// wire. Characters such as `{`, `}` and `"` are percent-encoded here.
pub fn build_outbound_request(
    target: &ResolvedTarget,
    parts: &Parts,
    body: Bytes,
) -> Result<Request<Bytes>, ProxyError> {
    let raw = format!("{}{}", target.origin(), outbound_request_uri(&parts.uri));
    let normalized = Url::parse(&raw)
        .map_err(|e| ProxyError::Request(format!("invalid outbound url {}: {}", raw, e)))?;
    let uri: Uri = normalized
        .as_str()
        .parse()
        .map_err(|e| ProxyError::Request(format!("invalid outbound uri: {}", e)))?;

    let mut outbound = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .body(body)
        .map_err(|e| ProxyError::Request(e.to_string()))?;

    copy_forwarded_headers(&parts.headers, outbound.headers_mut());
    Ok(outbound)
}

/// Copy of a buffered request. The body is reference counted, not copied.
pub fn duplicate_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

/// Relay a buffered backend response: status, every header, body bytes
pub fn relay_response(upstream: &Response<Bytes>) -> Response<Full<Bytes>> {
    let mut relayed = Response::new(Full::new(upstream.body().clone()));
    *relayed.status_mut() = upstream.status();
    let headers = relayed.headers_mut();
    for (name, value) in upstream.headers() {
        headers.append(name.clone(), value.clone());
    }
    relayed
}

/// Plain-text error response for a failed request
pub fn error_response(err: &ProxyError) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{}\n", err))));
    *response.status_mut() = err.status_code();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
