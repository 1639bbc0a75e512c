// Request signing module (AWS Signature Version 4)

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::Request;
use sha2::{Digest, Sha256};

use crate::constants::{
    HEADER_AMZ_CONTENT_SHA256, HEADER_AMZ_DATE, HEADER_AMZ_SECURITY_TOKEN, SIGNING_ALGORITHM,
};
use crate::credentials::{CredentialStore, CredentialTicket};
use crate::endpoint::ResolvedTarget;
use crate::error::ProxyError;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Everything the signature is computed over
pub struct SigningParams<'a> {
    pub method: &'a str,
    /// Canonical URI, see [`canonical_uri`]
    pub uri: &'a str,
    /// Canonical query string, see [`canonical_query_string`]
    pub query_string: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub payload: &'a [u8],
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub date: &'a str,     // Format: YYYYMMDD
    pub datetime: &'a str, // Format: YYYYMMDDTHHMMSSZ
}

fn sorted_header_names(headers: &HashMap<String, String>) -> Vec<(String, &str)> {
    let mut sorted: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

fn signed_headers(headers: &HashMap<String, String>) -> String {
    sorted_header_names(headers)
        .into_iter()
        .map(|(k, _)| k)
        .collect::<Vec<_>>()
        .join(";")
}

/// Trim and collapse runs of whitespace inside a header value
fn canonical_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn create_canonical_request(params: &SigningParams) -> String {
    let payload_hash = sha256_hex(params.payload);

    let canonical_headers = sorted_header_names(params.headers)
        .iter()
        .map(|(k, v)| format!("{}:{}", k, canonical_header_value(v)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n{}\n{}\n{}\n\n{}\n{}",
        params.method,
        params.uri,
        params.query_string,
        canonical_headers,
        signed_headers(params.headers),
        payload_hash
    )
}

pub fn create_string_to_sign(params: &SigningParams) -> String {
    let canonical_request = create_canonical_request(params);
    let canonical_request_hash = sha256_hex(canonical_request.as_bytes());

    format!(
        "{}\n{}\n{}\n{}",
        SIGNING_ALGORITHM,
        params.datetime,
        credential_scope(params),
        canonical_request_hash
    )
}

fn credential_scope(params: &SigningParams) -> String {
    format!(
        "{}/{}/{}/aws4_request",
        params.date, params.region, params.service
    )
}

pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Hex-encoded signature. A pure function of `params`.
pub fn compute_signature(params: &SigningParams) -> String {
    let string_to_sign = create_string_to_sign(params);
    let k_signing = derive_signing_key(
        params.secret_key,
        params.date,
        params.region,
        params.service,
    );
    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}

/// Value of the `Authorization` header for `params`
pub fn sign_request(params: &SigningParams) -> String {
    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        SIGNING_ALGORITHM,
        params.access_key,
        credential_scope(params),
        signed_headers(params.headers),
        compute_signature(params)
    )
}

/// Canonical URI for non-S3 services: each segment of the already-encoded
/// path is encoded once more.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical query string: decoded, re-encoded with RFC 3986 rules and sorted
/// by name then value.
pub fn canonical_query_string(query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return String::new();
    };

    let decode = |raw: &str| -> String {
        let raw = raw.replace('+', " ");
        match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => raw,
        }
    };

    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                urlencoding::encode(&decode(name)).into_owned(),
                urlencoding::encode(&decode(value)).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signs outbound requests for the resolved region and service
#[derive(Debug)]
pub struct RequestSigner {
    store: Arc<CredentialStore>,
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(store: Arc<CredentialStore>, target: &ResolvedTarget) -> Self {
        Self {
            store,
            region: target.region.clone(),
            service: target.service.clone(),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Attach SigV4 headers to `request`, timestamped at `now`.
    ///
    /// The body must already be fully buffered; it is hashed into the
    /// signature and later sent unchanged. Returns the ticket used so the
    /// caller can invalidate exactly that ticket on a 403.
    ///
    /// # Errors
    ///
    /// `ProxyError::Credentials` if no ticket can be acquired,
    /// `ProxyError::Request` if the request has no host or a header is not
    /// representable.
    pub async fn sign(
        &self,
        request: &mut Request<Bytes>,
        now: DateTime<Utc>,
    ) -> Result<Arc<CredentialTicket>, ProxyError> {
        let ticket = self.store.get_or_acquire().await?;

        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(request.body());

        let host = request
            .uri()
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| ProxyError::Request("outbound request has no host".to_string()))?;

        let request_headers = request.headers_mut();
        request_headers.remove(AUTHORIZATION);
        insert_header(request_headers, HEADER_AMZ_DATE, &datetime)?;
        insert_header(request_headers, HEADER_AMZ_CONTENT_SHA256, &payload_hash)?;
        match ticket.session_token.as_deref() {
            Some(token) => insert_header(request_headers, HEADER_AMZ_SECURITY_TOKEN, token)?,
            None => {
                request_headers.remove(HEADER_AMZ_SECURITY_TOKEN);
            }
        }

        let mut headers: HashMap<String, String> = HashMap::new();
        headers.insert("host".to_string(), host);
        for (name, value) in request_headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            match headers.get_mut(name.as_str()) {
                Some(existing) => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                None => {
                    headers.insert(name.as_str().to_string(), value);
                }
            }
        }

        let uri = canonical_uri(request.uri().path());
        let query_string = canonical_query_string(request.uri().query());
        let method = request.method().as_str().to_string();

        let params = SigningParams {
            method: &method,
            uri: &uri,
            query_string: &query_string,
            headers: &headers,
            payload: request.body(),
            access_key: &ticket.access_key_id,
            secret_key: &ticket.secret_access_key,
            region: &self.region,
            service: &self.service,
            date: &date,
            datetime: &datetime,
        };
        let authorization = sign_request(&params);

        insert_header(request.headers_mut(), AUTHORIZATION.as_str(), &authorization)?;
        tracing::debug!(
            method = %method,
            path = %uri,
            region = %self.region,
            service = %self.service,
            "Signed outbound request"
        );

        Ok(ticket)
    }
}

fn insert_header(headers: &mut http::HeaderMap, name: &str, value: &str) -> Result<(), ProxyError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ProxyError::Request(format!("invalid header name {}: {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| ProxyError::Request(format!("invalid value for {}: {}", name, e)))?;
    headers.insert(name, value);
    Ok(())
}
