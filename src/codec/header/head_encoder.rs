//! Response head serialization.
//!
//! Serializes the status line and header section, resolving the framing
//! headers (`Content-Length` or `Transfer-Encoding: chunked`) from the
//! negotiated payload size and filling in the ambient `Date`, `Server` and
//! `Connection` headers. The header map is locked once serialization starts;
//! any later mutation attempt fails with `HeadersReadOnly`.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::HeaderValue;
use tokio_util::codec::Encoder;

use crate::date::DateService;
use crate::protocol::headers::KnownHeaderName;
use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial buffer reservation for one serialized head.
const INIT_HEADER_SIZE: usize = 4 * 1024;

const SERVER_NAME: HeaderValue = HeaderValue::from_static("ember");
const CLOSE: HeaderValue = HeaderValue::from_static("close");
const KEEP_ALIVE: HeaderValue = HeaderValue::from_static("keep-alive");
const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

/// Connection-level facts the encoder needs besides the head itself.
#[derive(Debug, Copy, Clone)]
pub struct HeadContext {
    pub payload_size: PayloadSize,
    /// Whether the connection stays open after this response.
    pub keep_alive: bool,
    /// Whether the request was HTTP/1.0, where keep-alive must be announced
    /// explicitly.
    pub http10: bool,
}

/// Encoder for the response status line and header section.
pub struct HeadEncoder {
    /// Emit a `Server` header when the response does not carry one.
    pub server_header: bool,
}

impl Encoder<(ResponseHead, HeadContext)> for HeadEncoder {
    type Error = SendError;

    fn encode(
        &mut self,
        item: (ResponseHead, HeadContext),
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let (mut head, context) = item;

        dst.reserve(INIT_HEADER_SIZE);
        // The status line is always emitted as HTTP/1.1; an HTTP/1.0 client
        // learns the body delimiter from the headers that follow.
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", head.status().as_str(), head.reason())?;

        resolve_framing_headers(&mut head, context.payload_size)?;

        let headers = head.headers_mut();
        if headers.get_known(KnownHeaderName::Date).is_none() {
            headers.insert_known(KnownHeaderName::Date, DateService::global().header_value())?;
        }
        if self.server_header && headers.get_known(KnownHeaderName::Server).is_none() {
            headers.insert_known(KnownHeaderName::Server, SERVER_NAME)?;
        }
        // An explicit Connection header from the application (e.g. an
        // upgrade response) wins over the computed one.
        if headers.get_known(KnownHeaderName::Connection).is_none() {
            if !context.keep_alive {
                headers.insert_known(KnownHeaderName::Connection, CLOSE)?;
            } else if context.http10 {
                headers.insert_known(KnownHeaderName::Connection, KEEP_ALIVE)?;
            }
        }
        headers.set_read_only();

        for (name, value) in head.headers().iter() {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Makes the headers agree with the body delimiter chosen for this response.
fn resolve_framing_headers(
    head: &mut ResponseHead,
    payload_size: PayloadSize,
) -> Result<(), SendError> {
    let bodyless = head.bodyless_status();
    let headers = head.headers_mut();
    match payload_size {
        PayloadSize::Length(length) => {
            if !bodyless {
                headers.insert_known(KnownHeaderName::ContentLength, HeaderValue::from(length))?;
            }
        }
        PayloadSize::Chunked => {
            headers.insert_known(KnownHeaderName::TransferEncoding, CHUNKED)?;
        }
        PayloadSize::Empty => {
            if !bodyless {
                headers.insert_known(KnownHeaderName::ContentLength, HeaderValue::from_static("0"))?;
            }
        }
        // The connection close delimits the body; no framing header exists
        // for it.
        PayloadSize::CloseDelimited => {}
    }
    Ok(())
}

/// Infallible `io::Write` over `BytesMut`, so `write!` formatting lands
/// straight in the output buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
