//! Paired request/response log files.
//!
//! Two append-only files are created once per process with unique names.
//! Each record is serialized to a single JSON line and written with one
//! `write_all` under that file's lock, so lines from concurrent requests
//! never interleave.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::{RecordSink, RequestRecord, ResponseRecord};
use crate::error::ProxyError;

struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFile {
    fn create(path: PathBuf) -> Result<Self, ProxyError> {
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ProxyError::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot create {}: {}", path.display(), e),
                ))
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn append<T: Serialize>(&self, record: &T) -> Result<(), ProxyError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| ProxyError::Sink(format!("{}: {}", self.path.display(), e)))?;
        line.push(b'\n');

        self.file
            .lock()
            .write_all(&line)
            .map_err(|e| ProxyError::Sink(format!("{}: {}", self.path.display(), e)))
    }

    fn sync(&self) -> Result<(), ProxyError> {
        let mut file = self.file.lock();
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| ProxyError::Sink(format!("{}: {}", self.path.display(), e)))
    }
}

pub struct FileSink {
    requests: LogFile,
    responses: LogFile,
}

impl FileSink {
    /// Create `request-<uuid>.log` and `response-<uuid>.log` in `dir`
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Io` if either file cannot be created.
    pub fn create(dir: &Path) -> Result<Self, ProxyError> {
        let requests = LogFile::create(dir.join(format!("request-{}.log", Uuid::new_v4())))?;
        let responses = LogFile::create(dir.join(format!("response-{}.log", Uuid::new_v4())))?;

        tracing::info!(
            request_log = %requests.path.display(),
            response_log = %responses.path.display(),
            "Writing logs to file enabled"
        );

        Ok(Self {
            requests,
            responses,
        })
    }

    pub fn request_log_path(&self) -> &Path {
        &self.requests.path
    }

    pub fn response_log_path(&self) -> &Path {
        &self.responses.path
    }
}

impl RecordSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn record(&self, request: &RequestRecord, response: &ResponseRecord) -> Result<(), ProxyError> {
        // Both writes are attempted even if the first fails
        let request_result = self.requests.append(request);
        let response_result = self.responses.append(response);
        request_result.and(response_result)
    }

    fn flush(&self) -> Result<(), ProxyError> {
        let request_result = self.requests.sync();
        let response_result = self.responses.sync();
        request_result.and(response_result)
    }
}
