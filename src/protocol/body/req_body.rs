use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, SinkExt, Stream, StreamExt};

use http_body::{Body, Frame};
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};

type ChunkReply = oneshot::Sender<Result<PayloadItem, ParseError>>;

/// Consumer side of the request body, handed to the application.
///
/// Each `poll_frame` sends a reply slot to the producer and waits for the
/// corresponding payload item. A dropped or cancelled producer surfaces as a
/// body-read error, never as a hang.
pub struct ReqBody {
    signal: mpsc::Sender<ChunkReply>,
    receiving: Option<oneshot::Receiver<Result<PayloadItem, ParseError>>>,
}

impl ReqBody {
    fn new(signal: mpsc::Sender<ChunkReply>) -> Self {
        Self { signal, receiving: None }
    }

    /// Creates the consumer/producer pair over `payload_stream`.
    ///
    /// `read_timeout`, when set, bounds each wait for the next payload frame;
    /// a peer that stalls mid-body fails the read instead of pinning the
    /// connection.
    pub fn channel<S>(
        payload_stream: &mut S,
        abort: CancellationToken,
        read_timeout: Option<Duration>,
    ) -> (ReqBody, ReqBodySender<'_, S>)
    where
        S: Stream + Unpin,
    {
        let (signal, requests) = mpsc::channel(16);
        let sender =
            ReqBodySender { payload_stream, requests, abort, read_timeout, eof: false };
        (ReqBody::new(signal), sender)
    }
}

/// Producer side: pumps payload frames from the framed stream into the
/// consumer on demand.
pub struct ReqBodySender<'conn, S>
where
    S: Stream + Unpin,
{
    payload_stream: &'conn mut S,
    requests: mpsc::Receiver<ChunkReply>,
    abort: CancellationToken,
    read_timeout: Option<Duration>,
    eof: bool,
}

impl<S> ReqBodySender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
{
    /// Serves chunk requests until the payload reaches EOF or the connection
    /// is aborted.
    ///
    /// Decode errors are forwarded to the waiting consumer and returned to
    /// the connection loop; both sides must observe a mid-body fault.
    pub async fn pump(&mut self) -> Result<(), ParseError> {
        loop {
            if self.eof {
                return Ok(());
            }

            let reply = select! {
                reply = self.requests.next() => reply,
                _ = self.abort.cancelled() => {
                    trace!("body pump cancelled");
                    return Err(ParseError::Aborted);
                }
            };

            let Some(reply) = reply else {
                // Consumer dropped; nothing to serve. Remaining payload is
                // drained by `finish`.
                return Ok(());
            };

            match self.next_payload_item().await {
                Ok(payload_item) => {
                    if payload_item.is_eof() {
                        self.eof = true;
                    }
                    // A consumer that gave up mid-request is fine.
                    let _ = reply.send(Ok(payload_item));
                }
                Err(e) => {
                    let _ = reply.send(Err(ParseError::invalid_body(e.to_string())));
                    return Err(e);
                }
            }
        }
    }

    /// Drains any unread payload so a half-read body cannot corrupt framing
    /// for the next request on this connection.
    pub async fn finish(&mut self) -> Result<(), ParseError> {
        let mut skipped: usize = 0;
        while !self.eof {
            if self.abort.is_cancelled() {
                return Err(ParseError::Aborted);
            }
            match self.next_payload_item().await? {
                PayloadItem::Chunk(bytes) => skipped += bytes.len(),
                PayloadItem::Eof => self.eof = true,
            }
        }
        if skipped > 0 {
            trace!(size = skipped, "skipped unread request body");
        }
        Ok(())
    }

    /// Whether the payload has been fully consumed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    async fn next_payload_item(&mut self) -> Result<PayloadItem, ParseError> {
        let next = match self.read_timeout {
            Some(limit) => match timeout(limit, self.payload_stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    return Err(ParseError::Io {
                        source: io::Error::new(
                            io::ErrorKind::TimedOut,
                            "request body read timed out",
                        ),
                    });
                }
            },
            None => self.payload_stream.next().await,
        };
        match next {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("received a message head in the payload phase");
                Err(ParseError::invalid_body("received a message head in the payload phase"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEndOfRequestContent),
        }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        loop {
            if let Some(receiver) = &mut self.receiving {
                let result = ready!(receiver.poll_unpin(cx));
                self.receiving.take();
                return match result {
                    Ok(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                    Ok(Ok(PayloadItem::Eof)) => Poll::Ready(None),
                    Ok(Err(e)) => Poll::Ready(Some(Err(e))),
                    // Producer dropped the reply slot: connection aborted.
                    Err(_) => Poll::Ready(Some(Err(ParseError::Aborted))),
                };
            }

            match ready!(self.signal.poll_ready_unpin(cx)) {
                Ok(()) => {
                    let (reply, receiver) = oneshot::channel();
                    match self.signal.start_send(reply) {
                        Ok(()) => {
                            self.receiving = Some(receiver);
                            continue;
                        }
                        Err(_) => return Poll::Ready(Some(Err(ParseError::Aborted))),
                    }
                }
                Err(_) => return Poll::Ready(Some(Err(ParseError::Aborted))),
            }
        }
    }
}
