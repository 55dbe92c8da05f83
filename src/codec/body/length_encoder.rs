use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::{PayloadItem, SendError};

/// Encoder for `Content-Length` delimited response bodies.
///
/// Enforces the declared length on both sides: a write past the declaration
/// is rejected before any of it is buffered, so the correct prefix already on
/// the wire stays intact, and EOF before the declaration is a short-body
/// error.
pub struct LengthEncoder {
    declared: u64,
    written: u64,
    finished: bool,
}

impl LengthEncoder {
    pub fn new(declared: u64) -> Self {
        Self { declared, written: 0, finished: declared == 0 }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn encode<D: Buf>(
        &mut self,
        item: PayloadItem<D>,
        dst: &mut BytesMut,
    ) -> Result<(), SendError> {
        match item {
            PayloadItem::Chunk(mut data) => {
                let size = data.remaining() as u64;
                if size == 0 {
                    return Ok(());
                }
                if self.finished || self.written + size > self.declared {
                    return Err(SendError::ResponseBodyTooLong { declared: self.declared });
                }
                dst.put(&mut data);
                self.written += size;
                if self.written == self.declared {
                    self.finished = true;
                }
                Ok(())
            }
            PayloadItem::Eof => {
                if self.written < self.declared {
                    return Err(SendError::ResponseBodyTooShort {
                        declared: self.declared,
                        written: self.written,
                    });
                }
                self.finished = true;
                Ok(())
            }
        }
    }
}
