//! Console sink: one compact line per request, or a multi-line block in
//! pretty mode.

use std::io::{self, Write};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use super::{RecordSink, RequestRecord, ResponseRecord};
use crate::constants::LOG_TIMESTAMP_FORMAT;
use crate::error::ProxyError;

pub struct ConsoleSink {
    prettify: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// Sink writing to stdout
    pub fn stdout(prettify: bool) -> Self {
        Self::with_writer(prettify, Box::new(io::stdout()))
    }

    pub fn with_writer(prettify: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            prettify,
            out: Mutex::new(out),
        }
    }
}

impl RecordSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn record(&self, request: &RequestRecord, response: &ResponseRecord) -> Result<(), ProxyError> {
        let now = Local::now();
        let text = if self.prettify {
            render_pretty(request, response, now)
        } else {
            render_compact(request, response, now)
        };

        let mut out = self.out.lock();
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| ProxyError::Sink(format!("console: {}", e)))
    }
}

/// `<timestamp>  -> METHOD; remote; uri; body; status; 0.000s`
pub fn render_compact(request: &RequestRecord, response: &ResponseRecord, now: DateTime<Local>) -> String {
    format!(
        "{}  -> {}; {}; {}; {}; {}; {:.3}s\n",
        now.format(LOG_TIMESTAMP_FORMAT),
        request.method,
        request.remote_addr,
        request.request_uri,
        request.body,
        response.status_code,
        request.elapsed
    )
}

pub fn render_pretty(request: &RequestRecord, response: &ResponseRecord, now: DateTime<Local>) -> String {
    format!(
        "\n========================\n{}\nRemote Address: {}\nRequest URI: {}\nMethod: {}\nStatus: {}\nTook: {:.3}s\nBody:\n{}\n",
        now.format(LOG_TIMESTAMP_FORMAT),
        request.remote_addr,
        request.request_uri,
        request.method,
        response.status_code,
        request.elapsed,
        indent_json(&request.body)
    )
}

/// Re-indent a JSON document with two spaces. Anything that does not parse
/// is returned unchanged.
pub fn indent_json(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}
