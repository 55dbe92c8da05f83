//! Request head decoding and response head encoding.

mod head_encoder;
mod header_decoder;

pub use head_encoder::HeadContext;
pub use head_encoder::HeadEncoder;
pub use header_decoder::HeaderDecoder;
pub use header_decoder::ParsedHead;
