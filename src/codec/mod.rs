//! Wire codecs: framed request decoding on the read side, head and body
//! encoders on the write side.

pub mod body;
pub mod header;

mod request_decoder;
pub use request_decoder::RequestDecoder;
