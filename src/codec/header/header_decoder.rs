//! Request head parsing.
//!
//! Wraps `httparse` for the raw request line and header section, then lifts
//! the result into the typed [`RequestHead`]: byte ranges of every header are
//! recorded first, the header section is split off the read buffer, and the
//! ranges are converted into header values without copying. The payload
//! delimiter for the request body is derived here as well, so the framed
//! decoder can switch phases without re-inspecting headers.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderValue, Method, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::TrailerLimits;
use crate::protocol::headers::{KnownHeaderName, TransferCoding};
use crate::protocol::{ConnectionLimits, HeaderMap, ParseError, PayloadSize, RequestHead, path};
use crate::utils::ensure;

/// Hard cap on header fields per request; the per-connection limit can only
/// lower it.
const MAX_HEADER_NUM: usize = 64;

/// A fully parsed request head plus the facts the framed decoder needs to
/// set up the body phase.
#[derive(Debug)]
pub struct ParsedHead {
    pub head: RequestHead,
    pub payload_size: PayloadSize,
    /// Header budget left for the trailer section of a chunked body.
    pub trailer_limits: TrailerLimits,
}

/// Decoder for the request line and header section.
pub struct HeaderDecoder {
    limits: ConnectionLimits,
}

impl HeaderDecoder {
    pub fn new(limits: ConnectionLimits) -> Self {
        Self { limits }
    }
}

impl Decoder for HeaderDecoder {
    type Item = ParsedHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Shortest parseable request: "GET / HTTP/1.1\r\n\r\n".
        if src.len() < 14 {
            return Ok(None);
        }

        let max_header_count = self.limits.max_header_count.min(MAX_HEADER_NUM);
        let max_header_bytes = self.limits.max_header_bytes;

        let mut req = httparse::Request::new(&mut []);
        let mut header_storage: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

        let parsed = req.parse_with_uninit_headers(src, &mut header_storage).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(max_header_count),
            Error::Version => ParseError::InvalidVersion(None),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed? {
            Status::Complete(body_offset) => {
                trace!(header_size = body_offset, "parsed request head");
                ensure!(
                    body_offset <= max_header_bytes,
                    ParseError::too_large_header(body_offset, max_header_bytes)
                );

                let header_count = req.headers.len();
                ensure!(
                    header_count <= max_header_count,
                    ParseError::too_many_headers(max_header_count)
                );

                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, req.headers, &mut header_index);

                let version = match req.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion(req.version)),
                };

                let method =
                    Method::from_bytes(req.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
                        .map_err(|_| ParseError::InvalidMethod)?;

                let raw_target = req.path.ok_or(ParseError::InvalidRequestTarget)?.to_string();
                let uri = build_uri(&raw_target)?;

                // The head is complete; detach its bytes so header values can
                // reference them without copying.
                let header_bytes = src.split_to(body_offset).freeze();

                let mut headers = HeaderMap::new();
                for index in &header_index[..header_count] {
                    // httparse has already verified the value holds only
                    // visible ASCII plus SP and HTAB.
                    let value = unsafe {
                        HeaderValue::from_maybe_shared_unchecked(
                            header_bytes.slice(index.value.0..index.value.1),
                        )
                    };
                    headers.append_parsed(&header_bytes[index.name.0..index.name.1], value)?;
                }

                let head = RequestHead::new(method, uri, raw_target, version, headers);

                if head.version() == Version::HTTP_11
                    && head.headers().get_known(KnownHeaderName::Host).is_none()
                {
                    return Err(ParseError::invalid_header("missing host header"));
                }

                let payload_size = parse_payload(&head, &self.limits)?;

                let trailer_limits = TrailerLimits {
                    max_count: max_header_count.saturating_sub(header_count),
                    max_bytes: max_header_bytes.saturating_sub(body_offset),
                };

                Ok(Some(ParsedHead { head, payload_size, trailer_limits }))
            }
            Status::Partial => {
                ensure!(
                    src.len() <= max_header_bytes,
                    ParseError::too_large_header(src.len(), max_header_bytes)
                );
                Ok(None)
            }
        }
    }
}

/// Byte ranges of one header's name and value inside the head buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] =
    [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            index.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Builds the typed URI from the raw request target, removing dot segments
/// from origin-form paths before they can reach routing or the filesystem.
fn build_uri(raw_target: &str) -> Result<Uri, ParseError> {
    if raw_target.starts_with('/') {
        let (raw_path, query) = match raw_target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw_target, None),
        };
        if path::contains_dot_segments(raw_path.as_bytes()) {
            let mut buf = raw_path.as_bytes().to_vec();
            let len = path::remove_dot_segments(&mut buf);
            buf.truncate(len);
            let mut normalized =
                String::from_utf8(buf).map_err(|_| ParseError::InvalidRequestTarget)?;
            if let Some(query) = query {
                normalized.push('?');
                normalized.push_str(query);
            }
            return Uri::try_from(normalized).map_err(|_| ParseError::InvalidRequestTarget);
        }
    }
    Uri::try_from(raw_target).map_err(|_| ParseError::InvalidRequestTarget)
}

/// Selects the request body delimiter from the parsed head, per RFC 9112
/// section 6.
fn parse_payload(head: &RequestHead, limits: &ConnectionLimits) -> Result<PayloadSize, ParseError> {
    let transfer_coding = TransferCoding::parse(head.headers());
    let has_content_length = head.headers().get_known(KnownHeaderName::ContentLength).is_some();

    if head.upgrade_requested()
        && (transfer_coding != TransferCoding::None || head.headers().content_length().unwrap_or(0) > 0)
    {
        return Err(ParseError::UpgradeRequestCannotHavePayload);
    }

    match transfer_coding {
        TransferCoding::Chunked => {
            if has_content_length {
                return Err(ParseError::invalid_content_length(
                    "transfer-encoding and content-length both present",
                ));
            }
            Ok(PayloadSize::Chunked)
        }
        // A final coding other than chunked leaves the body length
        // undeterminable.
        TransferCoding::Other => Err(ParseError::LengthRequired),
        TransferCoding::None => match head.headers().content_length() {
            Some(0) | None => Ok(PayloadSize::Empty),
            Some(length) => {
                if let Some(max_size) = limits.max_request_body_size {
                    ensure!(length <= max_size, ParseError::body_too_large(max_size));
                }
                Ok(PayloadSize::Length(length))
            }
        },
    }
}
