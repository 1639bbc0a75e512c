// File logging tests driven through ProxyHandler::from_config

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::Full;
use serde_json::Value;

use search_sigv4_proxy::config::ProxyConfig;
use search_sigv4_proxy::proxy::ProxyHandler;

use super::support::{remote, CountingProvider, ScriptedUpstream};

fn log_files(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(prefix)
        })
        .collect()
}

fn read_json_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is one JSON record"))
        .collect()
}

fn file_logging_config(dir: &Path) -> ProxyConfig {
    let mut config = ProxyConfig::new("http://localhost:9201");
    config.no_sign = true;
    config.verbose = true;
    config.log_to_file = true;
    config.log_dir = dir.to_path_buf();
    config
}

fn search(i: usize) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/idx/_search?from={}", i))
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(format!("{{\"from\":{}}}", i))))
        .unwrap()
}

#[tokio::test]
async fn test_file_logging_writes_paired_records() {
    let dir = tempfile::tempdir().unwrap();
    let handler = ProxyHandler::from_config(
        &file_logging_config(dir.path()),
        CountingProvider::new(),
        ScriptedUpstream::ok(),
    )
    .unwrap();

    let response = handler.handle(search(0), remote()).await;
    assert_eq!(response.status(), StatusCode::OK);
    handler.shutdown();

    let request_logs = log_files(dir.path(), "request-");
    let response_logs = log_files(dir.path(), "response-");
    assert_eq!(request_logs.len(), 1);
    assert_eq!(response_logs.len(), 1);

    let requests = read_json_lines(&request_logs[0]);
    let responses = read_json_lines(&response_logs[0]);
    assert_eq!(requests.len(), 1);
    assert_eq!(responses.len(), 1);

    let request = requests[0].as_object().unwrap();
    let keys: Vec<&str> = request.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["RequestId", "DateTime", "RemoteAddr", "RequestUri", "Method", "Elapsed", "Body"]
    );
    assert_eq!(request["RequestUri"], "/idx/_search?from=0");
    assert_eq!(request["Method"], "POST");
    assert_eq!(request["Body"], "{\"from\":0}");

    let response = responses[0].as_object().unwrap();
    let keys: Vec<&str> = response.keys().map(String::as_str).collect();
    assert_eq!(keys, ["RequestId", "Body", "StatusCode"]);
    assert_eq!(response["RequestId"], request["RequestId"]);
    assert_eq!(response["StatusCode"], 200);
}

#[tokio::test]
async fn test_concurrent_requests_log_one_line_each() {
    let dir = tempfile::tempdir().unwrap();
    let handler = Arc::new(
        ProxyHandler::from_config(
            &file_logging_config(dir.path()),
            CountingProvider::new(),
            ScriptedUpstream::ok(),
        )
        .unwrap(),
    );

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.handle(search(i), remote()).await.status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }
    handler.shutdown();

    let requests = read_json_lines(&log_files(dir.path(), "request-")[0]);
    let responses = read_json_lines(&log_files(dir.path(), "response-")[0]);
    assert_eq!(requests.len(), 50);
    assert_eq!(responses.len(), 50);

    let mut request_ids: Vec<&str> = requests
        .iter()
        .map(|r| r["RequestId"].as_str().unwrap())
        .collect();
    let mut response_ids: Vec<&str> = responses
        .iter()
        .map(|r| r["RequestId"].as_str().unwrap())
        .collect();
    request_ids.sort_unstable();
    response_ids.sort_unstable();
    assert_eq!(request_ids, response_ids, "every request has exactly one response");
    request_ids.dedup();
    assert_eq!(request_ids.len(), 50, "request ids are unique");
}

#[tokio::test]
async fn test_no_files_without_verbose() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = file_logging_config(dir.path());
    config.verbose = false;

    let handler =
        ProxyHandler::from_config(&config, CountingProvider::new(), ScriptedUpstream::ok())
            .unwrap();
    handler.handle(search(1), remote()).await;

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unwritable_log_dir_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_logging_config(&dir.path().join("missing"));

    let result =
        ProxyHandler::from_config(&config, CountingProvider::new(), ScriptedUpstream::ok());
    assert!(result.is_err());
}
