//! The application seam: one async call per request.

use std::future::Future;

use async_trait::async_trait;
use http_body::Body;

use crate::protocol::body::ReqBody;
use crate::protocol::{BoxError, Request, Response};

/// Application entry point invoked once per decoded request.
///
/// The request body streams chunks on demand; the handler may read part of
/// it, all of it, or none. An `Err` return becomes a plain 500 response.
#[async_trait]
pub trait Handler {
    type RespBody: Body;
    type Error: Into<BoxError>;

    async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

/// Adapter turning a plain async function into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Body,
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(request).await
    }
}

pub fn make_handler<F, RespBody, Err, Fut>(f: F) -> HandlerFn<F>
where
    RespBody: Body,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<ReqBody>) -> Fut,
{
    HandlerFn { f }
}
