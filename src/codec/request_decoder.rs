//! Framed request decoding.
//!
//! Two-phase state machine driven by [`tokio_util::codec::FramedRead`]: the
//! header phase produces a [`Message::Header`] and arms the payload decoder
//! chosen from the parsed head, the payload phase produces
//! [`Message::Payload`] frames until EOF, then the decoder drops back to the
//! header phase for the next pipelined request.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{
    ConnectionLimits, Message, ParseError, PayloadItem, PayloadSize, RequestHead,
};

pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    max_request_body_size: Option<u64>,
}

impl RequestDecoder {
    pub fn new(limits: ConnectionLimits) -> Self {
        Self {
            header_decoder: HeaderDecoder::new(limits),
            payload_decoder: None,
            max_request_body_size: limits.max_request_body_size,
        }
    }

    /// Whether the decoder sits between requests, with no partially decoded
    /// body outstanding.
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // Body finished; the next decode starts a new head.
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some(parsed) => {
                let payload_decoder = if parsed.head.upgrade_requested() {
                    PayloadDecoder::upgrade()
                } else {
                    match parsed.payload_size {
                        PayloadSize::Length(length) => PayloadDecoder::fix_length(length),
                        PayloadSize::Chunked => PayloadDecoder::chunked(
                            self.max_request_body_size,
                            parsed.trailer_limits,
                        ),
                        PayloadSize::Empty | PayloadSize::CloseDelimited => PayloadDecoder::empty(),
                    }
                };
                self.payload_decoder = Some(payload_decoder);
                Some(Message::Header((parsed.head, parsed.payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode_eof(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        // A complete head followed by EOF is still a valid final request;
        // its body phase will see the EOF on the next call.
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            // The peer closed mid-head.
            None => Err(ParseError::invalid_header("connection closed inside a request head")),
        }
    }
}
