// Constants module - default values and fixed protocol strings

// =============================================================================
// Server defaults
// =============================================================================

/// Default port used to build the listen address
pub const DEFAULT_PORT: u16 = 9200;

/// Default bind host
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Default inbound read timeout in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Default write timeout in seconds (also bounds the upstream call)
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Grace period for in-flight requests on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

// =============================================================================
// Forwarding
// =============================================================================

/// Inbound headers copied to the upstream request. Everything else is dropped.
///
/// Recent Elasticsearch/Kibana versions reject requests missing these.
pub const FORWARDED_HEADERS: [&str; 2] = ["kbn-version", "content-type"];

/// Number of dot-separated labels in a signable endpoint host
/// (`<domain>.<region>.<service>.<provider>.<tld>`)
pub const SIGNABLE_HOST_LABELS: usize = 5;

// =============================================================================
// Request signing
// =============================================================================

/// SigV4 algorithm identifier
pub const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Timestamp header added by the signer
pub const HEADER_AMZ_DATE: &str = "x-amz-date";

/// Payload hash header added by the signer
pub const HEADER_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Session token header added for temporary credentials
pub const HEADER_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

// =============================================================================
// Logging
// =============================================================================

/// Default directory for request/response log files
pub const DEFAULT_LOG_DIR: &str = ".";

/// Timestamp layout used in console output and request records
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
