//! Chunked transfer-coding wire fragments.
//!
//! Pure, allocation-free helpers shared by the chunked payload encoder and
//! any fast path that interleaves chunk framing with raw file bytes.

/// CRLF terminating each chunk's data.
pub const CHUNK_SUFFIX: &[u8] = b"\r\n";

/// The zero-length chunk plus empty trailer section closing a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Longest prefix: 16 lowercase hex digits for a 64-bit size, plus CRLF.
const MAX_PREFIX_LEN: usize = 18;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// The size line starting a chunk: minimal lowercase hex digits plus CRLF,
/// byte-identical to `format!("{:x}\r\n", size)`.
#[derive(Debug, Copy, Clone)]
pub struct ChunkPrefix {
    buf: [u8; MAX_PREFIX_LEN],
    len: u8,
}

impl ChunkPrefix {
    pub fn new(size: usize) -> Self {
        let mut buf = [0u8; MAX_PREFIX_LEN];
        let mut len = 0;

        if size == 0 {
            buf[0] = b'0';
            len = 1;
        } else {
            let digits = ((usize::BITS - size.leading_zeros()) as usize).div_ceil(4);
            for i in (0..digits).rev() {
                buf[len] = HEX_DIGITS[(size >> (i * 4)) & 0xf];
                len += 1;
            }
        }

        buf[len] = b'\r';
        buf[len + 1] = b'\n';
        Self { buf, len: (len + 2) as u8 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

/// Begins a chunk of `size` bytes.
pub fn begin_chunk(size: usize) -> ChunkPrefix {
    ChunkPrefix::new(size)
}

/// Ends a chunk.
pub fn end_chunk() -> &'static [u8] {
    CHUNK_SUFFIX
}
