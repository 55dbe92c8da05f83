use bytes::{Buf, Bytes};

/// A frame of an HTTP message stream: either the parsed head or a payload item.
///
/// The generic parameter `T` is the head type (request head on the read side,
/// response head plus framing on the write side), `Data` the payload chunk type.
pub enum Message<T, Data: Buf = Bytes> {
    /// The message head.
    Header(T),
    /// A chunk of payload data or the end-of-payload marker.
    Payload(PayloadItem<Data>),
}

/// An item produced or consumed by the payload codecs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data.
    Chunk(Data),
    /// End of the payload stream.
    Eof,
}

/// Framing classification of an HTTP message body.
///
/// On the request side this is derived from the parsed headers; on the
/// response side it is derived from the body's size hint and the negotiated
/// HTTP version, and selects the payload encoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Body with a known length in bytes (`Content-Length`).
    Length(u64),
    /// Chunked transfer coding.
    Chunked,
    /// No body at all.
    Empty,
    /// Body delimited by closing the connection (HTTP/1.0 responses of
    /// unknown length, where chunked framing is unavailable).
    CloseDelimited,
}

impl PayloadSize {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<T, D: Buf> Message<T, D> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }
}
