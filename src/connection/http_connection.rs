//! Per-connection protocol driver.
//!
//! One [`HttpConnection`] owns a transport's read and write halves and runs
//! the request/response loop: decode a head, hand the request to the handler
//! while concurrently pumping body frames to it, drain whatever the handler
//! left unread, produce the response, and either loop for the next pipelined
//! request or close. All protocol policy that spans a whole exchange lives
//! here: keep-alive, expect-continue, upgrade detection, HEAD and bodyless
//! suppression, and the error-to-status mapping when parsing fails.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::{Method, StatusCode, Version};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec::RequestDecoder;
use crate::codec::header::HeadContext;
use crate::connection::OutputProducer;
use crate::handler::Handler;
use crate::protocol::body::ReqBody;
use crate::protocol::headers::TransferCoding;
use crate::protocol::{
    BoxError, ConnectionLimits, HttpError, Message, ParseError, PayloadItem, PayloadSize, Request,
    RequestHead, Response, ResponseHead, SendError,
};

pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    output: Arc<OutputProducer<W>>,
    abort: CancellationToken,
    request_body_timeout: Option<Duration>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_limits(reader, writer, ConnectionLimits::default())
    }

    pub fn with_limits(reader: R, writer: W, limits: ConnectionLimits) -> Self {
        let abort = CancellationToken::new();
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(limits), 8 * 1024),
            output: Arc::new(OutputProducer::new(writer, limits.server_header, abort.clone())),
            abort,
            request_body_timeout: limits.request_body_timeout,
        }
    }

    /// Requests connection teardown from outside the loop, e.g. on server
    /// shutdown. Pending body reads fail, later writes become no-ops.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Serves requests on this connection until the peer closes, keep-alive
    /// ends, or a protocol fault poisons the connection.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let result = self.handle_requests(handler).await;
        if let Err(e) = &result {
            debug!(error = %e, "connection closing on error");
        }
        // Best effort; the transport may already be gone.
        let _ = self.output.finish().await;
        result
    }

    async fn handle_requests<H>(&mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header((head, payload_size)))) => {
                    let keep_alive = self.handle_request(head, payload_size, &handler).await?;
                    if !keep_alive {
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("received a body frame while expecting a request head");
                    let e =
                        ParseError::invalid_body("received a body frame while expecting a request head");
                    self.send_error_response(e.status()).await;
                    return Err(e.into());
                }

                Some(Err(e)) => {
                    info!(error = %e, "failed to parse request");
                    self.send_error_response(e.status()).await;
                    return Err(e.into());
                }

                None => return Ok(()),
            }
        }
    }

    /// Serves one request/response exchange. Returns whether the connection
    /// may be reused.
    async fn handle_request<H>(
        &mut self,
        head: RequestHead,
        payload_size: PayloadSize,
        handler: &Arc<H>,
    ) -> Result<bool, HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let mut keep_alive = head.keep_alive_requested();
        let upgrade = head.upgrade_requested();
        let is_head = head.method() == Method::HEAD;
        let http10 = head.version() == Version::HTTP_10;
        if upgrade {
            // The engine does not speak the upgraded protocol; the exchange
            // ends this connection's HTTP life either way.
            keep_alive = false;
        }

        if head.version() == Version::HTTP_11
            && head.expect_continue()
            && !payload_size.is_empty()
        {
            self.output.write_continue().await?;
        }

        let (req_body, mut body_sender) =
            ReqBody::channel(&mut self.framed_read, self.abort.clone(), self.request_body_timeout);
        let request = Request::from_parts(head, req_body);

        // Run the handler and the body pump concurrently: the handler may
        // block on body data only the pump can deliver, and the pump must not
        // outlive the handler's interest.
        let mut pump_error: Option<ParseError> = None;
        let response_result = {
            tokio::pin! {
                let handler_future = handler.call(request);
                let pump_future = body_sender.pump();
            }

            let mut pump_done = false;
            loop {
                select! {
                    biased;
                    response = &mut handler_future => break response,
                    pump_result = &mut pump_future, if !pump_done => {
                        pump_done = true;
                        if let Err(e) = pump_result {
                            pump_error = Some(e);
                        }
                    }
                }
            }
        };

        // Whatever the handler left unread must leave the transport before
        // the next head can be parsed.
        if pump_error.is_none() && !upgrade && !self.abort.is_cancelled() {
            if let Err(e) = body_sender.finish().await {
                pump_error = Some(e);
            }
        }
        drop(body_sender);

        match response_result {
            Ok(response) => {
                self.send_response(response, is_head, http10, &mut keep_alive).await?;
            }
            Err(e) => {
                let cause: BoxError = e.into();
                error!(cause = %cause, "handler error");
                self.send_simple_response(StatusCode::INTERNAL_SERVER_ERROR, keep_alive, http10)
                    .await?;
            }
        }

        if let Some(e) = pump_error {
            // The response went out, but the request body framing broke; the
            // connection cannot be trusted for another request.
            return Err(e.into());
        }

        Ok(keep_alive && !upgrade)
    }

    async fn send_response<B>(
        &mut self,
        response: Response<B>,
        is_head: bool,
        http10: bool,
        keep_alive: &mut bool,
    ) -> Result<(), HttpError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let (mut head, mut body) = response.into_parts();

        for hook in head.take_on_starting() {
            if let Err(e) = hook(&mut head) {
                error!("on-starting hook failed: {e}");
                *keep_alive = false;
                return self
                    .send_simple_response(StatusCode::INTERNAL_SERVER_ERROR, false, http10)
                    .await;
            }
        }
        let completed_hooks = head.take_on_completed();

        let suppress_body = is_head || head.bodyless_status();
        let payload_size = response_framing(&mut head, &body, http10, keep_alive)?;

        let context = HeadContext { payload_size, keep_alive: *keep_alive, http10 };
        self.output.write_head(head, context).await?;

        if suppress_body {
            self.output.skip_body().await;
        } else {
            loop {
                match body.frame().await {
                    Some(Ok(frame)) => {
                        // Trailer frames have no HTTP/1.1 representation here
                        // and are dropped.
                        if let Ok(data) = frame.into_data() {
                            if let Err(e) = self.output.write_payload(PayloadItem::Chunk(data)).await
                            {
                                self.output.abort("response framing violated");
                                return Err(e.into());
                            }
                        }
                    }
                    Some(Err(e)) => {
                        self.output.abort("response body failed");
                        return Err(
                            SendError::invalid_body(format!("response body error: {e}")).into()
                        );
                    }
                    None => break,
                }
            }
            if let Err(e) = self.output.finish_body().await {
                self.output.abort("response body incomplete");
                return Err(e.into());
            }
        }

        self.output.flush().await?;

        for hook in completed_hooks {
            if let Err(e) = hook().await {
                error!("on-completed hook failed: {e}");
            }
        }
        Ok(())
    }

    /// Emits a header-only response, used for handler failures and parse
    /// errors while the head is still unsent.
    async fn send_simple_response(
        &mut self,
        status: StatusCode,
        keep_alive: bool,
        http10: bool,
    ) -> Result<(), HttpError> {
        let context = HeadContext { payload_size: PayloadSize::Empty, keep_alive, http10 };
        self.output.write_head(ResponseHead::new(status), context).await?;
        self.output.finish_body().await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Best-effort error response before closing. If a response already
    /// started, only the abort remains.
    async fn send_error_response(&mut self, status: StatusCode) {
        if let Err(e) = self.send_simple_response(status, false, false).await {
            debug!(error = %e, "failed to send error response");
            self.output.abort("error response failed");
        }
    }
}

/// Decides the response body delimiter from the response head, the body's
/// size hint and the connection state.
fn response_framing<B: Body>(
    head: &mut ResponseHead,
    body: &B,
    http10: bool,
    keep_alive: &mut bool,
) -> Result<PayloadSize, SendError> {
    if head.bodyless_status() {
        return Ok(PayloadSize::Empty);
    }
    // An application-set chunked Transfer-Encoding takes precedence; a
    // Content-Length next to it must not reach the wire.
    if TransferCoding::parse(head.headers()).is_chunked() {
        if http10 {
            // HTTP/1.0 cannot express chunked framing; the close delimits
            // the body instead.
            head.headers_mut().remove("Transfer-Encoding")?;
            *keep_alive = false;
            return Ok(PayloadSize::CloseDelimited);
        }
        if head.headers().content_length().is_some() {
            head.headers_mut().remove("Content-Length")?;
        }
        return Ok(PayloadSize::Chunked);
    }
    // An explicit application Content-Length wins over the size hint; actual
    // writes are checked against it.
    if let Some(declared) = head.headers().content_length() {
        return Ok(if declared == 0 { PayloadSize::Empty } else { PayloadSize::Length(declared) });
    }
    Ok(match body.size_hint().exact() {
        Some(0) => PayloadSize::Empty,
        Some(length) => PayloadSize::Length(length),
        None => {
            if http10 {
                *keep_alive = false;
                PayloadSize::CloseDelimited
            } else {
                PayloadSize::Chunked
            }
        }
    })
}
