//! Streaming request-body plumbing.
//!
//! The connection cannot hand the framed read half to the application
//! directly: the application may drop the body half-read, while the protocol
//! requires the remaining payload frames to be drained before the next
//! request can be parsed. The split is:
//!
//! - [`ReqBody`]: consumer side, handed to the application, implements
//!   `http_body::Body`.
//! - [`ReqBodySender`]: producer side, pumped by the connection loop
//!   concurrently with the application, reads payload frames from the framed
//!   stream and forwards them on demand.
//!
//! The two halves talk over an mpsc channel of oneshot reply slots, which
//! gives per-chunk backpressure: the producer reads the next frame only when
//! the consumer asks for one. Aborting the connection cancels the producer,
//! which poisons pending and future reads on the consumer side.

mod req_body;

pub use req_body::ReqBody;
pub use req_body::ReqBodySender;
