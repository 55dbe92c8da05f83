use bytes::{Buf, BufMut, BytesMut};

use crate::codec::body::chunk::{CHUNK_SUFFIX, LAST_CHUNK, begin_chunk};
use crate::protocol::{PayloadItem, SendError};

/// Encoder for chunked transfer-coded response bodies.
///
/// Empty data frames are skipped: a zero-length chunk on the wire would
/// terminate the body, so only EOF may produce one.
pub struct ChunkedEncoder {
    finished: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { finished: false }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn encode<D: Buf>(
        &mut self,
        item: PayloadItem<D>,
        dst: &mut BytesMut,
    ) -> Result<(), SendError> {
        if self.finished {
            return Err(SendError::UnexpectedMessage {
                reason: "payload after the final chunk",
            });
        }

        match item {
            PayloadItem::Chunk(mut data) => {
                let size = data.remaining();
                if size == 0 {
                    return Ok(());
                }
                dst.extend_from_slice(begin_chunk(size).as_bytes());
                dst.put(&mut data);
                dst.extend_from_slice(CHUNK_SUFFIX);
                Ok(())
            }
            PayloadItem::Eof => {
                dst.extend_from_slice(LAST_CHUNK);
                self.finished = true;
                Ok(())
            }
        }
    }
}
