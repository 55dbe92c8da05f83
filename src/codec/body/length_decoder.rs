use bytes::{Buf, BytesMut};

use crate::protocol::{ParseError, PayloadItem};

/// Decoder for a `Content-Length` delimited body: passes through exactly
/// `remaining` bytes, then EOF.
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn is_end(&self) -> bool {
        self.remaining == 0
    }

    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let take = std::cmp::min(self.remaining, src.len() as u64) as usize;
        let bytes = src.copy_to_bytes(take);
        self.remaining -= take as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    /// The stream ended; any undelivered bytes mean the client lied about
    /// the length.
    pub fn decode_eof(&mut self) -> Result<Option<PayloadItem>, ParseError> {
        if self.remaining > 0 {
            return Err(ParseError::UnexpectedEndOfRequestContent);
        }
        Ok(Some(PayloadItem::Eof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_exact_length() {
        let mut decoder = LengthDecoder::new(5);
        let mut src = BytesMut::from("Helloworld");
        match decoder.decode(&mut src).unwrap() {
            Some(PayloadItem::Chunk(bytes)) => assert_eq!(&bytes[..], b"Hello"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(decoder.decode(&mut src).unwrap(), Some(PayloadItem::Eof)));
        // Pipelined bytes stay put.
        assert_eq!(&src[..], b"world");
    }

    #[test]
    fn split_delivery() {
        let mut decoder = LengthDecoder::new(5);
        let mut src = BytesMut::from("He");
        match decoder.decode(&mut src).unwrap() {
            Some(PayloadItem::Chunk(bytes)) => assert_eq!(&bytes[..], b"He"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(decoder.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"llo");
        match decoder.decode(&mut src).unwrap() {
            Some(PayloadItem::Chunk(bytes)) => assert_eq!(&bytes[..], b"llo"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(decoder.is_end());
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut decoder = LengthDecoder::new(5);
        let mut src = BytesMut::from("He");
        let _ = decoder.decode(&mut src).unwrap();
        assert!(matches!(
            decoder.decode_eof(),
            Err(ParseError::UnexpectedEndOfRequestContent)
        ));
    }
}
