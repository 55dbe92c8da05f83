//! Body framing codecs: decoders for the request side, encoders for the
//! response side, plus the shared chunked wire fragments.

pub mod chunk;

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_decoder::TrailerLimits;
pub use length_decoder::LengthDecoder;
pub use payload_decoder::PayloadDecoder;

mod chunked_encoder;
mod length_encoder;
mod payload_encoder;

pub use chunked_encoder::ChunkedEncoder;
pub use length_encoder::LengthEncoder;
pub use payload_encoder::PayloadEncoder;
