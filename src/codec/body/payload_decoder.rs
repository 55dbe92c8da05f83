use bytes::BytesMut;

use crate::codec::body::chunked_decoder::{ChunkedDecoder, TrailerLimits};
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem};

/// Dispatch over the body delimiter negotiated for one request.
pub struct PayloadDecoder {
    kind: Kind,
}

enum Kind {
    /// No payload; a single EOF frame is produced immediately.
    NoBody,
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    /// Upgraded connection: the remaining stream is opaque and passed
    /// through untouched. Never reaches EOF on its own.
    Upgrade,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn fix_length(length: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(length)) }
    }

    pub fn chunked(body_limit: Option<u64>, trailer_limits: TrailerLimits) -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new(body_limit, trailer_limits)) }
    }

    pub fn upgrade() -> Self {
        Self { kind: Kind::Upgrade }
    }

    pub fn is_upgrade(&self) -> bool {
        matches!(self.kind, Kind::Upgrade)
    }

    /// True once the final payload frame has been produced and the decoder
    /// can return to the header phase.
    pub fn is_end(&self) -> bool {
        match &self.kind {
            Kind::NoBody => true,
            Kind::Length(length) => length.is_end(),
            Kind::Chunked(chunked) => chunked.is_end(),
            Kind::Upgrade => false,
        }
    }

    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        match &mut self.kind {
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::Length(length) => length.decode(src),
            Kind::Chunked(chunked) => chunked.decode(src),
            Kind::Upgrade => {
                if src.is_empty() {
                    return Ok(None);
                }
                let bytes = src.split().freeze();
                Ok(Some(PayloadItem::Chunk(bytes)))
            }
        }
    }

    pub fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        match &mut self.kind {
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::Length(length) => {
                if let Some(item) = length.decode(src)? {
                    return Ok(Some(item));
                }
                length.decode_eof()
            }
            Kind::Chunked(chunked) => {
                if let Some(item) = chunked.decode(src)? {
                    return Ok(Some(item));
                }
                Err(ParseError::UnexpectedEndOfRequestContent)
            }
            Kind::Upgrade => {
                if src.is_empty() {
                    return Ok(Some(PayloadItem::Eof));
                }
                Ok(Some(PayloadItem::Chunk(src.split().freeze())))
            }
        }
    }
}
