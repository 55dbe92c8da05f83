//! Per-connection protocol limits.
//!
//! The engine enforces these as limits only; picking values is the hosting
//! layer's concern.

use std::time::Duration;

/// Limits consumed by the request decoders and the output producer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Maximum number of header fields per header section, request trailers
    /// included.
    pub max_header_count: usize,
    /// Maximum total size in bytes of a header section, request trailers
    /// included.
    pub max_header_bytes: usize,
    /// Maximum request body size in bytes, counting chunked framing overhead.
    /// `None` disables the limit.
    pub max_request_body_size: Option<u64>,
    /// Maximum wait for the next request body frame once a body read is in
    /// progress. A stalled peer fails the body read with an I/O timeout.
    /// `None` disables the limit.
    pub request_body_timeout: Option<Duration>,
    /// Emit the `Server` header on responses.
    pub server_header: bool,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_header_count: 64,
            max_header_bytes: 8 * 1024,
            max_request_body_size: Some(30 * 1024 * 1024),
            request_body_timeout: Some(Duration::from_secs(60)),
            server_header: true,
        }
    }
}
