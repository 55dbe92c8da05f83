//! An embeddable asynchronous HTTP/1.x request/response engine
//!
//! This crate drives the HTTP/1.0 and HTTP/1.1 exchange over any pair of
//! async read/write halves: it parses request heads, streams request bodies
//! on demand, runs an application handler, and produces correctly framed
//! responses. It is an engine, not a framework: routing, TLS and listener
//! management belong to the hosting layer.
//!
//! # Features
//!
//! - Streaming request and response bodies with per-chunk backpressure
//! - Chunked transfer decoding with trailer validation, and chunked encoding
//! - Keep-alive and pipelined requests, with automatic body draining
//! - Expect-continue, upgrade detection, HEAD and bodyless-status handling
//! - Request target canonicalization (dot-segment removal)
//! - Per-connection limits on header size, header count and body size
//! - Zero-copy header parsing
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! use ember_http::connection::HttpConnection;
//! use ember_http::handler::make_handler;
//! use ember_http::protocol::body::ReqBody;
//! use ember_http::protocol::{Request, Response};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!     info!(port = 8080, "listening");
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer);
//!             if let Err(e) = connection.process(handler).await {
//!                 error!(cause = %e, "connection closed on error");
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(
//!     request: Request<ReqBody>,
//! ) -> Result<Response<http_body_util::Full<bytes::Bytes>>, Box<dyn Error + Send + Sync>> {
//!     let greeting = format!("Hello, {}!", request.path());
//!     Ok(Response::new(StatusCode::OK, http_body_util::Full::new(greeting.into())))
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod date;
mod utils;

pub use date::DateService;
