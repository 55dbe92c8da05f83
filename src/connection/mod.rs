//! Connection-level protocol drivers.

mod http_connection;
mod output;

pub use http_connection::HttpConnection;
pub use output::OutputProducer;
