use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// Largest chunk size accepted, and the cap on hex digits in a size line.
const MAX_CHUNK_SIZE: u64 = 0x7FFF_FFFF;
const MAX_SIZE_DIGITS: u8 = 8;

/// Header budget left over for the trailer section after the initial header
/// section has been parsed. Trailer fields share the connection's header
/// limits with the fields that preceded the body.
#[derive(Debug, Copy, Clone)]
pub struct TrailerLimits {
    pub max_count: usize,
    pub max_bytes: usize,
}

/// Incremental decoder for the chunked transfer coding.
///
/// `decode` consumes whatever framing bytes are available and yields at most
/// one payload item per call: a data slice (possibly a fragment of a larger
/// chunk) or EOF once the terminating zero-length chunk and its trailer
/// section have been consumed. Trailer fields are validated against the
/// remaining header budget and then discarded.
pub struct ChunkedDecoder {
    phase: Phase,
    size: u64,
    size_digits: u8,
    body_limit: Option<u64>,
    body_consumed: u64,
    trailer_limits: TrailerLimits,
    trailer_bytes: usize,
    trailer_count: usize,
    trailer_line: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    TrailerStart,
    TrailerLine,
    TrailerLineLf,
    EndLf,
    End,
}

impl ChunkedDecoder {
    pub fn new(body_limit: Option<u64>, trailer_limits: TrailerLimits) -> Self {
        Self {
            phase: Phase::Size,
            size: 0,
            size_digits: 0,
            body_limit,
            body_consumed: 0,
            trailer_limits,
            trailer_bytes: 0,
            trailer_count: 0,
            trailer_line: Vec::new(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.phase == Phase::End
    }

    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        loop {
            if self.phase == Phase::End {
                return Ok(Some(PayloadItem::Eof));
            }
            if src.is_empty() {
                return Ok(None);
            }

            let before = src.len();
            let in_trailer = matches!(
                self.phase,
                Phase::TrailerStart | Phase::TrailerLine | Phase::TrailerLineLf | Phase::EndLf
            );
            let step = self.step(src);
            let consumed = before - src.len();

            if in_trailer {
                self.trailer_bytes += consumed;
                if self.trailer_bytes > self.trailer_limits.max_bytes {
                    return Err(ParseError::too_large_header(
                        self.trailer_bytes,
                        self.trailer_limits.max_bytes,
                    ));
                }
            } else {
                self.body_consumed += consumed as u64;
                if let Some(limit) = self.body_limit {
                    if self.body_consumed > limit {
                        return Err(ParseError::body_too_large(limit));
                    }
                }
            }

            match step? {
                Poll::Ready(Some(bytes)) => return Ok(Some(PayloadItem::Chunk(bytes))),
                Poll::Ready(None) => return Ok(Some(PayloadItem::Eof)),
                Poll::Pending => continue,
            }
        }
    }

    /// Advances the state machine by one transition. `Poll::Pending` means
    /// more framing bytes are wanted, not that the task should park.
    fn step(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        match self.phase {
            Phase::Size => self.step_size(src),
            Phase::SizeLws => self.step_size_lws(src),
            Phase::Extension => self.step_extension(src),
            Phase::SizeLf => self.step_size_lf(src),
            Phase::Data => Ok(self.step_data(src)),
            Phase::DataCr => self.expect(src, b'\r', Phase::DataLf, ParseError::BadChunkSuffix),
            Phase::DataLf => {
                let result = self.expect(src, b'\n', Phase::Size, ParseError::BadChunkSuffix);
                self.size = 0;
                self.size_digits = 0;
                result
            }
            Phase::TrailerStart => self.step_trailer_start(src),
            Phase::TrailerLine => self.step_trailer_line(src),
            Phase::TrailerLineLf => self.step_trailer_line_lf(src),
            Phase::EndLf => {
                let result = self.expect(src, b'\n', Phase::End, ParseError::BadChunkSuffix)?;
                if self.phase == Phase::End {
                    trace!(size = self.body_consumed, "chunked body complete");
                    return Ok(Poll::Ready(None));
                }
                Ok(result)
            }
            Phase::End => unreachable!("handled by the caller"),
        }
    }

    fn step_size(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        let byte = src.get_u8();
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte + 10 - b'a',
            b'A'..=b'F' => byte + 10 - b'A',
            b'\t' | b' ' => {
                self.require_digits()?;
                self.phase = Phase::SizeLws;
                return Ok(Poll::Pending);
            }
            b';' => {
                self.require_digits()?;
                self.phase = Phase::Extension;
                return Ok(Poll::Pending);
            }
            b'\r' => {
                self.require_digits()?;
                self.phase = Phase::SizeLf;
                return Ok(Poll::Pending);
            }
            _ => return Err(ParseError::BadChunkSizeData),
        };

        self.size_digits += 1;
        if self.size_digits > MAX_SIZE_DIGITS {
            return Err(ParseError::BadChunkSizeData);
        }
        self.size = (self.size << 4) | u64::from(digit);
        if self.size > MAX_CHUNK_SIZE {
            return Err(ParseError::BadChunkSizeData);
        }
        Ok(Poll::Pending)
    }

    fn step_size_lws(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        match src.get_u8() {
            b'\t' | b' ' => Ok(Poll::Pending),
            b';' => {
                self.phase = Phase::Extension;
                Ok(Poll::Pending)
            }
            b'\r' => {
                self.phase = Phase::SizeLf;
                Ok(Poll::Pending)
            }
            _ => Err(ParseError::BadChunkSizeData),
        }
    }

    fn step_extension(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        match src.get_u8() {
            b'\r' => {
                self.phase = Phase::SizeLf;
                Ok(Poll::Pending)
            }
            // Chunk extensions are skipped, but a bare LF inside one is
            // still a framing fault.
            b'\n' => Err(ParseError::BadChunkSizeData),
            _ => Ok(Poll::Pending),
        }
    }

    fn step_size_lf(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        if src.get_u8() != b'\n' {
            return Err(ParseError::BadChunkSizeData);
        }
        if self.size == 0 {
            self.phase = Phase::TrailerStart;
        } else {
            trace!(size = self.size, "incoming chunk");
            self.phase = Phase::Data;
        }
        Ok(Poll::Pending)
    }

    fn step_data(&mut self, src: &mut BytesMut) -> Poll<Option<Bytes>> {
        let take = std::cmp::min(self.size, src.len() as u64) as usize;
        let bytes = src.split_to(take).freeze();
        self.size -= take as u64;
        if self.size == 0 {
            self.phase = Phase::DataCr;
        }
        Poll::Ready(Some(bytes))
    }

    fn step_trailer_start(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        let byte = src.get_u8();
        if byte == b'\r' {
            self.phase = Phase::EndLf;
        } else {
            self.trailer_line.clear();
            self.trailer_line.push(byte);
            self.phase = Phase::TrailerLine;
        }
        Ok(Poll::Pending)
    }

    fn step_trailer_line(&mut self, src: &mut BytesMut) -> Result<Poll<Option<Bytes>>, ParseError> {
        match src.get_u8() {
            b'\r' => self.phase = Phase::TrailerLineLf,
            b'\n' => return Err(ParseError::invalid_header("bare LF in trailer field")),
            byte => self.trailer_line.push(byte),
        }
        Ok(Poll::Pending)
    }

    fn step_trailer_line_lf(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Poll<Option<Bytes>>, ParseError> {
        if src.get_u8() != b'\n' {
            return Err(ParseError::invalid_header("bare CR in trailer field"));
        }
        self.trailer_count += 1;
        if self.trailer_count > self.trailer_limits.max_count {
            return Err(ParseError::too_many_headers(self.trailer_limits.max_count));
        }
        validate_trailer_field(&self.trailer_line)?;
        self.trailer_line.clear();
        self.phase = Phase::TrailerStart;
        Ok(Poll::Pending)
    }

    fn expect(
        &mut self,
        src: &mut BytesMut,
        expected: u8,
        next: Phase,
        error: ParseError,
    ) -> Result<Poll<Option<Bytes>>, ParseError> {
        if src.get_u8() != expected {
            return Err(error);
        }
        self.phase = next;
        Ok(Poll::Pending)
    }

    fn require_digits(&self) -> Result<(), ParseError> {
        if self.size_digits == 0 {
            return Err(ParseError::BadChunkSizeData);
        }
        Ok(())
    }
}

/// Checks a complete trailer line for `token ":" value` shape. The field is
/// discarded afterwards; trailers are not exposed to the application.
fn validate_trailer_field(line: &[u8]) -> Result<(), ParseError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ParseError::invalid_header("trailer field without a colon"))?;
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&b| is_token_byte(b)) {
        return Err(ParseError::invalid_header("invalid trailer field name"));
    }
    if line[colon + 1..].iter().any(|&b| b < 0x20 && b != b'\t') {
        return Err(ParseError::invalid_header("control character in trailer field value"));
    }
    Ok(())
}

fn is_token_byte(byte: u8) -> bool {
    matches!(byte,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
        | b'`' | b'|' | b'~' | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> ChunkedDecoder {
        ChunkedDecoder::new(None, TrailerLimits { max_count: 64, max_bytes: 8 * 1024 })
    }

    fn collect(decoder: &mut ChunkedDecoder, src: &mut BytesMut) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::new();
        loop {
            match decoder.decode(src)? {
                Some(PayloadItem::Chunk(bytes)) => out.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return Ok(out),
                None => panic!("decoder wanted more bytes"),
            }
        }
    }

    #[test]
    fn simple_chunked_body() {
        let mut src = BytesMut::from("5\r\nHello\r\n0\r\n\r\n");
        let mut decoder = decoder();
        assert_eq!(collect(&mut decoder, &mut src).unwrap(), b"Hello");
        assert!(decoder.is_end());
        assert!(src.is_empty());
    }

    #[test]
    fn multiple_chunks_with_extension() {
        let mut src = BytesMut::from("5\r\nHello\r\nC;lang=en\r\n, chunked wo\r\n3\r\nrld\r\n0\r\n\r\n");
        let mut decoder = decoder();
        assert_eq!(collect(&mut decoder, &mut src).unwrap(), b"Hello, chunked world");
    }

    #[test]
    fn size_line_lws_is_tolerated() {
        let mut src = BytesMut::from("5 \t \r\nHello\r\n0\r\n\r\n");
        let mut decoder = decoder();
        assert_eq!(collect(&mut decoder, &mut src).unwrap(), b"Hello");
    }

    #[test]
    fn incremental_delivery() {
        let mut decoder = decoder();
        let mut src = BytesMut::from("5\r\nHel");
        match decoder.decode(&mut src).unwrap() {
            Some(PayloadItem::Chunk(bytes)) => assert_eq!(&bytes[..], b"Hel"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"lo\r\n0\r\n\r\n");
        assert_eq!(collect(&mut decoder, &mut src).unwrap(), b"lo");
        assert!(decoder.is_end());
    }

    #[test]
    fn trailers_are_validated_and_discarded() {
        let mut src =
            BytesMut::from("5\r\nHello\r\n0\r\nExpires: Sat, 01 Jan 2028 00:00:00 GMT\r\nX-Check: 1\r\n\r\nGET /");
        let mut decoder = decoder();
        assert_eq!(collect(&mut decoder, &mut src).unwrap(), b"Hello");
        // Pipelined bytes after the body stay in the buffer.
        assert_eq!(&src[..], b"GET /");
    }

    #[test]
    fn trailer_without_colon_is_rejected() {
        let mut src = BytesMut::from("0\r\nnot-a-field\r\n\r\n");
        let err = decoder().decode(&mut src).unwrap_err();
        assert!(matches!(err, ParseError::InvalidHeader { .. }));
    }

    #[test]
    fn trailer_count_limit() {
        let mut decoder =
            ChunkedDecoder::new(None, TrailerLimits { max_count: 1, max_bytes: 8 * 1024 });
        let mut src = BytesMut::from("0\r\na: 1\r\nb: 2\r\n\r\n");
        let err = decoder.decode(&mut src).unwrap_err();
        assert!(matches!(err, ParseError::TooManyHeaders { max_num: 1 }));
    }

    #[test]
    fn trailer_size_limit() {
        let mut decoder = ChunkedDecoder::new(None, TrailerLimits { max_count: 64, max_bytes: 8 });
        let mut src = BytesMut::from("0\r\nx-long-name: value\r\n\r\n");
        let err = decoder.decode(&mut src).unwrap_err();
        assert!(matches!(err, ParseError::TooLargeHeader { .. }));
    }

    #[test]
    fn invalid_size_byte() {
        let mut src = BytesMut::from("xx\r\nHello\r\n0\r\n\r\n");
        assert!(matches!(decoder().decode(&mut src), Err(ParseError::BadChunkSizeData)));
    }

    #[test]
    fn size_overflow() {
        let mut src = BytesMut::from("80000000\r\n");
        assert!(matches!(decoder().decode(&mut src), Err(ParseError::BadChunkSizeData)));
    }

    #[test]
    fn size_line_too_long() {
        let mut src = BytesMut::from("000000001\r\n1\r\na\r\n0\r\n\r\n");
        assert!(matches!(decoder().decode(&mut src), Err(ParseError::BadChunkSizeData)));
    }

    #[test]
    fn missing_chunk_suffix() {
        let mut src = BytesMut::from("5\r\nHelloxx0\r\n\r\n");
        let mut decoder = decoder();
        match decoder.decode(&mut src).unwrap() {
            Some(PayloadItem::Chunk(bytes)) => assert_eq!(&bytes[..], b"Hello"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(decoder.decode(&mut src), Err(ParseError::BadChunkSuffix)));
    }

    #[test]
    fn body_size_limit_counts_framing() {
        // "5\r\nHello\r\n" is 10 bytes of framing plus data.
        let mut decoder =
            ChunkedDecoder::new(Some(9), TrailerLimits { max_count: 64, max_bytes: 8 * 1024 });
        let mut src = BytesMut::from("5\r\nHello\r\n0\r\n\r\n");
        let mut total = Vec::new();
        let err = loop {
            match decoder.decode(&mut src) {
                Ok(Some(PayloadItem::Chunk(bytes))) => total.extend_from_slice(&bytes),
                Ok(_) => panic!("expected the limit to trip"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, ParseError::RequestBodyTooLarge { max_size: 9 }));
    }

    #[test]
    fn body_size_limit_allows_exact_fit() {
        let body = "5\r\nHello\r\n0\r\n\r\n";
        // Trailer-section bytes (the final "\r\n" after "0\r\n") do not count
        // toward the body budget.
        let mut decoder =
            ChunkedDecoder::new(Some(13), TrailerLimits { max_count: 64, max_bytes: 8 * 1024 });
        let mut src = BytesMut::from(body);
        assert_eq!(collect(&mut decoder, &mut src).unwrap(), b"Hello");
    }
}
