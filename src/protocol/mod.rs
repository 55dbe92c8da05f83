//! Protocol data model: the leaf types the codecs and the connection loop
//! are built from.
//!
//! # Components
//!
//! - [`headers`]: two-tier [`HeaderMap`] with read-only lock-down, plus
//!   `Connection` / `Transfer-Encoding` token parsing.
//! - [`path`]: RFC 3986 dot-segment removal for request targets.
//! - [`message`]: the [`Message`] / [`PayloadItem`] / [`PayloadSize`] stream
//!   vocabulary shared by the read and write pipelines.
//! - [`request`] / [`response`]: the surfaces handed to application code.
//! - [`body`]: the streaming request-body channel pair.
//! - [`error`]: [`ParseError`] (client framing faults, with status mapping),
//!   [`SendError`] (response production faults) and the top-level
//!   [`HttpError`].
//! - [`limits`]: per-connection limits consumed by decoders and producer.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

pub mod headers;
pub use headers::HeaderMap;

pub mod path;

mod limits;
pub use limits::ConnectionLimits;

mod request;
pub use request::Request;
pub use request::RequestHead;

mod response;
pub use response::BoxError;
pub use response::CompletedHook;
pub use response::Response;
pub use response::ResponseHead;
pub use response::StartingHook;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
