//! Serialized response output.
//!
//! All response bytes funnel through one [`OutputProducer`] per connection.
//! Encoding goes through a fair async mutex, so concurrent producers (the
//! handler plus the connection loop's control frames) interleave at frame
//! granularity and never interleave bytes. Flushing is coalesced: while one
//! flush is on the wire, later callers wait for its completion instead of
//! queueing their own, and re-flush only if new bytes were buffered in the
//! meantime.
//!
//! Aborting poisons the producer: the cancellation token fires so the body
//! pump stops, and every later write or flush becomes a silent no-op. The
//! transport is dropped without a clean shutdown, which is the only safe
//! signal once a response may have been half-written.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{HeadContext, HeadEncoder};
use crate::protocol::{PayloadItem, ResponseHead, SendError};

/// Buffered bytes beyond this trigger an eager flush, bounding memory for
/// producers faster than the peer.
const HIGH_WATER: usize = 64 * 1024;

struct OutputState {
    buffer: BytesMut,
    head_encoder: HeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

pub struct OutputProducer<W> {
    state: Mutex<OutputState>,
    /// Held only by the flusher currently on the wire.
    writer: Mutex<W>,
    /// Flush generation counter; bumped after every completed flush.
    flush_done: watch::Sender<u64>,
    aborted: AtomicBool,
    abort_token: CancellationToken,
}

impl<W> OutputProducer<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, server_header: bool, abort_token: CancellationToken) -> Self {
        let (flush_done, _) = watch::channel(0);
        Self {
            state: Mutex::new(OutputState {
                buffer: BytesMut::with_capacity(4 * 1024),
                head_encoder: HeadEncoder { server_header },
                payload_encoder: None,
            }),
            writer: Mutex::new(writer),
            flush_done,
            aborted: AtomicBool::new(false),
            abort_token,
        }
    }

    /// Poisons the producer and fires the connection's cancellation token.
    /// Idempotent; later writes and flushes turn into no-ops.
    pub fn abort(&self, reason: &str) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            debug!(reason, "output aborted");
            self.abort_token.cancel();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Buffers the serialized response head and arms the body encoder for
    /// the declared framing.
    pub async fn write_head(&self, head: ResponseHead, context: HeadContext) -> Result<(), SendError> {
        if self.is_aborted() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        if state.payload_encoder.is_some() {
            return Err(SendError::UnexpectedMessage {
                reason: "response head while the previous response is unfinished",
            });
        }

        trace!(status = %head.status(), "writing response head");
        let OutputState { buffer, head_encoder, payload_encoder } = &mut *state;
        head_encoder.encode((head, context), buffer)?;
        *payload_encoder = Some(PayloadEncoder::new(context.payload_size));

        let over_water = state.buffer.len() >= HIGH_WATER;
        drop(state);
        if over_water {
            self.flush().await?;
        }
        Ok(())
    }

    /// Buffers one body frame through the armed payload encoder.
    pub async fn write_payload<D: Buf>(&self, item: PayloadItem<D>) -> Result<(), SendError> {
        if self.is_aborted() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let OutputState { buffer, payload_encoder, .. } = &mut *state;
        let Some(encoder) = payload_encoder else {
            return Err(SendError::UnexpectedMessage { reason: "payload before the response head" });
        };
        encoder.encode(item, buffer)?;

        let over_water = state.buffer.len() >= HIGH_WATER;
        drop(state);
        if over_water {
            self.flush().await?;
        }
        Ok(())
    }

    /// Terminates the response body: emits the final framing (the last chunk
    /// for chunked bodies) and verifies declared-length responses are
    /// complete.
    pub async fn finish_body(&self) -> Result<(), SendError> {
        if self.is_aborted() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let OutputState { buffer, payload_encoder, .. } = &mut *state;
        let Some(mut encoder) = payload_encoder.take() else {
            return Err(SendError::UnexpectedMessage { reason: "body finish before the response head" });
        };
        encoder.encode(PayloadItem::<bytes::Bytes>::Eof, buffer)
    }

    /// Drops the armed body encoder without emitting final framing.
    ///
    /// Used when headers describe a body that is deliberately never sent:
    /// HEAD responses and bodyless statuses.
    pub async fn skip_body(&self) {
        if self.is_aborted() {
            return;
        }
        let mut state = self.state.lock().await;
        state.payload_encoder.take();
    }

    /// Buffers an interim `100 Continue` response and pushes it to the wire.
    pub async fn write_continue(&self) -> Result<(), SendError> {
        if self.is_aborted() {
            return Ok(());
        }
        {
            let mut state = self.state.lock().await;
            if state.payload_encoder.is_some() {
                return Err(SendError::UnexpectedMessage {
                    reason: "interim response inside another response",
                });
            }
            state.buffer.extend_from_slice(b"HTTP/1.1 100 Continue\r\n\r\n");
        }
        self.flush().await
    }

    /// Pushes every buffered byte to the transport and flushes it.
    ///
    /// When another flush is already in flight, waits for it and returns
    /// without writing if it covered this caller's bytes.
    pub async fn flush(&self) -> Result<(), SendError> {
        if self.is_aborted() {
            return Ok(());
        }
        let mut flush_done = self.flush_done.subscribe();
        loop {
            match self.writer.try_lock() {
                Ok(mut writer) => {
                    let bytes = {
                        let mut state = self.state.lock().await;
                        state.buffer.split()
                    };
                    let result = async {
                        if !bytes.is_empty() {
                            writer.write_all(&bytes).await?;
                        }
                        writer.flush().await
                    }
                    .await;
                    drop(writer);
                    self.flush_done.send_modify(|generation| *generation += 1);
                    return result.map_err(SendError::io);
                }
                Err(_) => {
                    // A flush is on the wire; wait for it instead of queueing
                    // a second writer.
                    if flush_done.changed().await.is_err() {
                        return Ok(());
                    }
                    if self.is_aborted() {
                        return Ok(());
                    }
                    let state = self.state.lock().await;
                    if state.buffer.is_empty() {
                        return Ok(());
                    }
                    // New bytes arrived after the in-flight flush started;
                    // try to become the flusher ourselves.
                }
            }
        }
    }

    /// Final flush plus a clean transport shutdown.
    pub async fn finish(&self) -> Result<(), SendError> {
        if self.is_aborted() {
            return Ok(());
        }
        self.flush().await?;
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(SendError::io)
    }
}
