use http::StatusCode;
use std::io;
use thiserror::Error;

use crate::protocol::headers::HeaderError;

/// Top-level error type for a connection.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// A client framing fault, classified by reason.
///
/// Every variant maps to the best status line that can still be emitted when
/// the response head has not been sent yet (see [`ParseError::status`]); the
/// connection is closed afterwards either way.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header section too large, current: {current_size} exceeds the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header count exceeds the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid request target")]
    InvalidRequestTarget,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("length required: transfer coding is neither chunked nor length-delimited")]
    LengthRequired,

    #[error("bad chunk size data")]
    BadChunkSizeData,

    #[error("bad chunk suffix")]
    BadChunkSuffix,

    #[error("unexpected end of request content")]
    UnexpectedEndOfRequestContent,

    #[error("request body larger than the limit {max_size}")]
    RequestBodyTooLarge { max_size: u64 },

    #[error("upgrade request cannot have a payload")]
    UpgradeRequestCannotHavePayload,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("request aborted")]
    Aborted,

    #[error("header error: {source}")]
    Header {
        #[from]
        source: HeaderError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn body_too_large(max_size: u64) -> Self {
        Self::RequestBodyTooLarge { max_size }
    }

    /// The status line to emit for this fault when the response head has not
    /// been produced yet.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            Self::InvalidVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            Self::LengthRequired => StatusCode::LENGTH_REQUIRED,
            Self::RequestBodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A fault while producing the response.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("response body exceeds the declared content-length {declared}")]
    ResponseBodyTooLong { declared: u64 },

    #[error("response body ended after {written} of {declared} declared bytes")]
    ResponseBodyTooShort { declared: u64, written: u64 },

    #[error("unexpected message: {reason}")]
    UnexpectedMessage { reason: &'static str },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl From<HeaderError> for SendError {
    fn from(e: HeaderError) -> Self {
        SendError::invalid_body(e.to_string())
    }
}

impl SendError {
    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
