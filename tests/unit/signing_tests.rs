// Signature verification tests
// Recomputes the signature of requests produced by RequestSigner

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http::request::Parts;
use http::Request;

use search_sigv4_proxy::credentials::{CredentialStore, CredentialTicket, StaticCredentialProvider};
use search_sigv4_proxy::endpoint::ResolvedTarget;
use search_sigv4_proxy::proxy::helpers::build_outbound_request;
use search_sigv4_proxy::signing::{
    canonical_query_string, canonical_uri, create_canonical_request, sha256_hex, sign_request,
    RequestSigner, SigningParams,
};

use super::support::SIGNED_ENDPOINT;

const ACCESS_KEY: &str = "AKIDEXAMPLE";
const SECRET_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

fn signer(session_token: Option<&str>) -> RequestSigner {
    let target = ResolvedTarget::resolve(SIGNED_ENDPOINT, true).unwrap();
    let ticket = CredentialTicket::new(ACCESS_KEY, SECRET_KEY, session_token.map(str::to_string));
    let store = Arc::new(CredentialStore::new(Arc::new(StaticCredentialProvider::new(ticket))));
    RequestSigner::new(store, &target)
}

/// Verify a signed request the way the receiving service would
fn expected_authorization(request: &Request<Bytes>) -> String {
    let mut headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter(|(name, _)| name.as_str() != "authorization")
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap().to_string()))
        .collect();
    headers.insert(
        "host".to_string(),
        request.uri().authority().unwrap().to_string(),
    );

    let datetime = headers["x-amz-date"].clone();
    let date = datetime[..8].to_string();
    let uri = canonical_uri(request.uri().path());
    let query_string = canonical_query_string(request.uri().query());

    sign_request(&SigningParams {
        method: request.method().as_str(),
        uri: &uri,
        query_string: &query_string,
        headers: &headers,
        payload: request.body(),
        access_key: ACCESS_KEY,
        secret_key: SECRET_KEY,
        region: "us-east-1",
        service: "es",
        date: &date,
        datetime: &datetime,
    })
}

#[tokio::test]
async fn test_signed_search_request_verifies() {
    let mut request = Request::builder()
        .method("POST")
        .uri(format!("{}/logs-2024.01.01/_search?size=5&q=level:error", SIGNED_ENDPOINT))
        .header("content-type", "application/json")
        .header("kbn-version", "8.11.0")
        .body(Bytes::from_static(b"{\"query\":{\"match_all\":{}}}"))
        .unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 30, 0).unwrap();
    signer(Some("session")).sign(&mut request, now).await.unwrap();

    let authorization = request.headers()["authorization"].to_str().unwrap();
    assert_eq!(authorization, expected_authorization(&request));
    assert!(authorization.contains(
        "SignedHeaders=content-type;host;kbn-version;x-amz-content-sha256;x-amz-date;x-amz-security-token"
    ));
    assert_eq!(request.headers()["x-amz-date"], "20240101T083000Z");
    assert_eq!(
        request.headers()["x-amz-content-sha256"],
        sha256_hex(b"{\"query\":{\"match_all\":{}}}").as_str()
    );
}

#[tokio::test]
async fn test_resigning_replaces_previous_signature() {
    let signer = signer(None);
    let mut request = Request::builder()
        .method("GET")
        .uri(format!("{}/_cat/indices", SIGNED_ENDPOINT))
        .body(Bytes::new())
        .unwrap();

    let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
    signer.sign(&mut request, first).await.unwrap();
    let first_authorization = request.headers()["authorization"].clone();
    signer.sign(&mut request, second).await.unwrap();

    assert_eq!(request.headers().get_all("authorization").iter().count(), 1);
    assert_eq!(request.headers().get_all("x-amz-date").iter().count(), 1);
    assert_ne!(request.headers()["authorization"], first_authorization);
    assert_eq!(
        request.headers()["authorization"].to_str().unwrap(),
        expected_authorization(&request)
    );
}

#[tokio::test]
async fn test_path_with_reserved_characters_verifies() {
    let mut request = Request::builder()
        .method("GET")
        .uri(format!("{}/my%20index/_doc/a:b", SIGNED_ENDPOINT))
        .body(Bytes::new())
        .unwrap();

    let now = Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap();
    signer(None).sign(&mut request, now).await.unwrap();

    assert_eq!(
        request.headers()["authorization"].to_str().unwrap(),
        expected_authorization(&request)
    );
}

/// Recompute the signature from what the HTTP client puts on the wire
fn wire_authorization(request: &Request<Bytes>) -> (String, String) {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.headers_mut() = request.headers().clone();
    let wire = reqwest::Request::try_from(copy).unwrap();

    let mut headers: HashMap<String, String> = wire
        .headers()
        .iter()
        .filter(|(name, _)| name.as_str() != "authorization")
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap().to_string()))
        .collect();
    let url = wire.url();
    let host = match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap(), port),
        None => url.host_str().unwrap().to_string(),
    };
    headers.insert("host".to_string(), host);

    let datetime = headers["x-amz-date"].clone();
    let date = datetime[..8].to_string();
    let uri = canonical_uri(url.path());
    let query_string = canonical_query_string(url.query());

    let authorization = sign_request(&SigningParams {
        method: wire.method().as_str(),
        uri: &uri,
        query_string: &query_string,
        headers: &headers,
        payload: request.body(),
        access_key: ACCESS_KEY,
        secret_key: SECRET_KEY,
        region: "us-east-1",
        service: "es",
        date: &date,
        datetime: &datetime,
    });
    (url.path().to_string(), authorization)
}

fn inbound_parts(path_and_query: &str) -> Parts {
    Request::builder()
        .method("GET")
        .uri(path_and_query)
        .body(())
        .unwrap()
        .into_parts()
        .0
}

#[tokio::test]
async fn test_signature_matches_request_as_sent() {
    let target = ResolvedTarget::resolve(SIGNED_ENDPOINT, true).unwrap();
    let signer = signer(None);
    let now = Utc.with_ymd_and_hms(2024, 2, 2, 10, 0, 0).unwrap();

    let cases = [
        ("/idx/_search?q=a+b", "/idx/_search"),
        ("/logs-*/_search", "/logs-*/_search"),
        ("/idx/_doc/%7Bx%7D", "/idx/_doc/%7Bx%7D"),
        ("/idx/_doc/{x}", "/idx/_doc/%7Bx%7D"),
        ("/idx/_doc/\"x\"", "/idx/_doc/%22x%22"),
    ];

    for (inbound, wire_path) in cases {
        let mut request =
            build_outbound_request(&target, &inbound_parts(inbound), Bytes::new()).unwrap();
        signer.sign(&mut request, now).await.unwrap();

        let (sent_path, recomputed) = wire_authorization(&request);
        assert_eq!(sent_path, wire_path, "inbound {:?}", inbound);
        assert_eq!(
            request.headers()["authorization"].to_str().unwrap(),
            recomputed,
            "signature must verify against the path as sent for {:?}",
            inbound
        );
    }
}

// Vectors from the AWS SigV4 test suite (region us-east-1, service "service",
// 20150830T123600Z). Expected values are published literals, not recomputed.

fn suite_params<'a>(
    uri: &'a str,
    query_string: &'a str,
    headers: &'a HashMap<String, String>,
) -> SigningParams<'a> {
    SigningParams {
        method: "GET",
        uri,
        query_string,
        headers,
        payload: b"",
        access_key: ACCESS_KEY,
        secret_key: SECRET_KEY,
        region: "us-east-1",
        service: "service",
        date: "20150830",
        datetime: "20150830T123600Z",
    }
}

fn suite_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("host".to_string(), "example.amazonaws.com".to_string());
    headers.insert("x-amz-date".to_string(), "20150830T123600Z".to_string());
    headers
}

#[test]
fn test_suite_get_vanilla_query_order_key_case() {
    let headers = suite_headers();
    let query_string = canonical_query_string(Some("Param2=value2&Param1=value1"));
    let params = suite_params("/", &query_string, &headers);

    assert_eq!(
        create_canonical_request(&params),
        "GET\n/\nParam1=value1&Param2=value2\n\
         host:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\n\
         host;x-amz-date\n\
         e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert!(sign_request(&params).ends_with(
        "Signature=b97d918cfa904a5beff61c982a1b6f458b799221646efd99d3219ec94cdf2500"
    ));
}

#[test]
fn test_suite_get_vanilla_query_unreserved() {
    let unreserved = "-._~0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let headers = suite_headers();
    let query_string = canonical_query_string(Some(&format!("{}={}", unreserved, unreserved)));
    assert_eq!(query_string, format!("{}={}", unreserved, unreserved));

    let params = suite_params("/", &query_string, &headers);
    assert!(sign_request(&params).ends_with(
        "Signature=9c3e54bfcdf0b19771a7f523ee5669cdf59bc7cc0884027167c21bb143a40197"
    ));
}

#[test]
fn test_suite_get_utf8_canonical_path() {
    let headers = suite_headers();
    let uri = canonical_uri("/\u{1234}");
    assert_eq!(uri, "/%E1%88%B4");

    let params = suite_params(&uri, "", &headers);
    assert!(create_canonical_request(&params).starts_with("GET\n/%E1%88%B4\n\n"));
}

#[test]
fn test_already_encoded_path_is_encoded_again() {
    assert_eq!(canonical_uri("/idx/_doc/%7Bx%7D"), "/idx/_doc/%257Bx%257D");
    assert_eq!(canonical_uri("/idx/_doc/%22x%22"), "/idx/_doc/%2522x%2522");
    assert_eq!(
        canonical_query_string(Some("q=a+b&size=10")),
        "q=a%20b&size=10"
    );
}
