use bytes::{Buf, BufMut, BytesMut};

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Dispatch over the framing negotiated for one response body.
pub struct PayloadEncoder {
    kind: Kind,
}

enum Kind {
    /// Response declared no body. Data frames are a producer bug.
    NoBody { finished: bool },
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// HTTP/1.0 fallback: raw bytes, the connection close marks the end.
    CloseDelimited { finished: bool },
}

impl PayloadEncoder {
    pub fn new(size: PayloadSize) -> Self {
        let kind = match size {
            PayloadSize::Length(length) => Kind::Length(LengthEncoder::new(length)),
            PayloadSize::Chunked => Kind::Chunked(ChunkedEncoder::new()),
            PayloadSize::Empty => Kind::NoBody { finished: false },
            PayloadSize::CloseDelimited => Kind::CloseDelimited { finished: false },
        };
        Self { kind }
    }

    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::NoBody { finished } | Kind::CloseDelimited { finished } => *finished,
            Kind::Length(length) => length.is_finished(),
            Kind::Chunked(chunked) => chunked.is_finished(),
        }
    }

    pub fn encode<D: Buf>(
        &mut self,
        item: PayloadItem<D>,
        dst: &mut BytesMut,
    ) -> Result<(), SendError> {
        match &mut self.kind {
            Kind::NoBody { finished } => match item {
                PayloadItem::Chunk(data) if data.has_remaining() => {
                    Err(SendError::UnexpectedMessage { reason: "payload on a bodyless response" })
                }
                PayloadItem::Chunk(_) => Ok(()),
                PayloadItem::Eof => {
                    *finished = true;
                    Ok(())
                }
            },
            Kind::Length(length) => length.encode(item, dst),
            Kind::Chunked(chunked) => chunked.encode(item, dst),
            Kind::CloseDelimited { finished } => match item {
                PayloadItem::Chunk(mut data) => {
                    dst.put(&mut data);
                    Ok(())
                }
                PayloadItem::Eof => {
                    *finished = true;
                    Ok(())
                }
            },
        }
    }
}
