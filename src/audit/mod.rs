//! Request/response recording.
//!
//! Each proxied request produces one [`RequestRecord`] and one
//! [`ResponseRecord`] sharing a correlation id. [`AuditLogger`] hands the pair
//! to every configured [`RecordSink`]; a failing sink is reported and skipped.

pub mod console;
pub mod file;

pub use console::ConsoleSink;
pub use file::FileSink;

use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::LOG_TIMESTAMP_FORMAT;
use crate::error::ProxyError;

/// Inbound side of a proxied request
///
/// Serialized field names are kept stable for downstream log consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RequestRecord {
    /// Correlation id shared with the matching [`ResponseRecord`]
    pub request_id: String,
    pub date_time: String,
    pub remote_addr: String,
    pub request_uri: String,
    pub method: String,
    /// Seconds spent forwarding and relaying
    pub elapsed: f64,
    /// Best-effort JSON excerpt of the request body
    pub body: String,
}

impl RequestRecord {
    /// Create a record with a fresh correlation id and the current local time
    pub fn new(
        remote_addr: String,
        request_uri: String,
        method: String,
        elapsed: f64,
        body: String,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            date_time: Local::now().format(LOG_TIMESTAMP_FORMAT).to_string(),
            remote_addr,
            request_uri,
            method,
            elapsed,
            body,
        }
    }
}

/// Backend side of a proxied request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseRecord {
    pub request_id: String,
    pub body: String,
    pub status_code: u16,
}

impl ResponseRecord {
    /// Create the response record paired with `request`
    pub fn for_request(request: &RequestRecord, body: String, status_code: u16) -> Self {
        Self {
            request_id: request.request_id.clone(),
            body,
            status_code,
        }
    }
}

/// Destination for request/response pairs
pub trait RecordSink: Send + Sync {
    /// Short name used in operational logs
    fn name(&self) -> &'static str;

    fn record(&self, request: &RequestRecord, response: &ResponseRecord) -> Result<(), ProxyError>;

    /// Flush buffered output. Called once at shutdown.
    fn flush(&self) -> Result<(), ProxyError> {
        Ok(())
    }
}

/// Fan-out over all configured sinks
#[derive(Default)]
pub struct AuditLogger {
    sinks: Vec<Box<dyn RecordSink>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Write the pair to every sink. Sink failures are logged, never returned.
    pub fn log(&self, request: &RequestRecord, response: &ResponseRecord) {
        for sink in &self.sinks {
            if let Err(e) = sink.record(request, response) {
                tracing::warn!(
                    sink = sink.name(),
                    request_id = %request.request_id,
                    error = %e,
                    "Failed to write request log"
                );
            }
        }
    }

    pub fn flush(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                tracing::warn!(sink = sink.name(), error = %e, "Failed to flush request log");
            }
        }
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

static JSON_FRAGMENT: OnceLock<Regex> = OnceLock::new();
static MULTI_OPERATION: OnceLock<Regex> = OnceLock::new();

fn json_fragment_pattern() -> &'static Regex {
    JSON_FRAGMENT.get_or_init(|| Regex::new(r"\{.*\}").expect("Invalid JSON fragment regex"))
}

fn multi_operation_pattern() -> &'static Regex {
    MULTI_OPERATION
        .get_or_init(|| Regex::new(r"_msearch|_bulk").expect("Invalid multi-operation regex"))
}

/// Pull a JSON-looking fragment out of a raw request dump.
///
/// This is a pattern match, not a parse: the dump is flattened onto one line
/// and the widest `{...}` span is returned. Multi-search and bulk requests
/// carry newline-delimited bodies and yield an empty excerpt.
pub fn extract_body_excerpt(dump: &str) -> String {
    let flattened = dump.replace('\n', " ");

    if multi_operation_pattern().is_match(&flattened) {
        return String::new();
    }

    json_fragment_pattern()
        .find(&flattened)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
