//! Backend response → inbound response.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers and pre-announce declared trailers
//! - Pick the flush policy (immediate, periodic, single framed write)
//! - Stream the body through a pooled buffer and forward trailers at the end
//!
//! # Design Decisions
//! - Headers are committed before streaming starts, so later copy errors can
//!   only be logged and end the body
//! - Backend read errors end the stream; caller write errors abort the copy
//! - The periodic flusher and the writer share one lock so chunks never interleave

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRAILER};
use axum::http::{HeaderMap, HeaderValue, Response};
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use http_body::{Body as _, Frame};
use http_body_util::{BodyExt, StreamBody};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::proxy::buffer::BufferPool;
use crate::proxy::hop::strip_hop_by_hop;

/// Frames queued between the copy task and the inbound connection.
const FRAME_QUEUE: usize = 16;

/// How streamed response bytes reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Every chunk goes out as soon as it is read.
    Immediate,
    /// Chunks accumulate and a timer flushes them.
    Periodic(Duration),
    /// The whole body is written as one framed message.
    Framed,
}

/// Server-sent events and bodies of unknown length flush per chunk; everything
/// else follows the configured interval, zero meaning one framed write.
pub fn flush_policy(headers: &HeaderMap, content_length: Option<u64>, interval: Duration) -> FlushPolicy {
    let event_stream = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().eq_ignore_ascii_case("text/event-stream"))
        .unwrap_or(false);

    if event_stream || content_length.is_none() {
        FlushPolicy::Immediate
    } else if interval.is_zero() {
        FlushPolicy::Framed
    } else {
        FlushPolicy::Periodic(interval)
    }
}

/// Trailer names the backend declared, lowercased.
fn declared_trailers(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(TRAILER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Convert a non-upgrade backend response into the inbound response.
pub async fn forward_response<B>(
    response: Response<B>,
    interval: Duration,
    buffers: Arc<BufferPool>,
    request_id: &str,
) -> GatewayResult<Response<Body>>
where
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: fmt::Display + Send,
{
    let (mut parts, body) = response.into_parts();

    let announced = declared_trailers(&parts.headers);
    strip_hop_by_hop(&mut parts.headers);
    parts.headers.remove(TRAILER);
    if !announced.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&announced.join(", ")) {
            parts.headers.insert(TRAILER, value);
        }
    }

    let content_length = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| body.size_hint().exact());

    let policy = flush_policy(&parts.headers, content_length, interval);
    tracing::trace!(request_id = %request_id, policy = ?policy, "Forwarding response body");

    let body = match policy {
        FlushPolicy::Framed => framed_body(body).await?,
        FlushPolicy::Immediate | FlushPolicy::Periodic(_) => {
            let (tx, rx) = mpsc::channel(FRAME_QUEUE);
            let writer = FlushWriter::new(tx, policy, buffers);
            let request_id = request_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = copy_body(body, writer, announced, &request_id).await {
                    tracing::warn!(request_id = %request_id, error = %e, "Response stream aborted");
                }
            });
            Body::new(StreamBody::new(frames(rx)))
        }
    };

    Ok(Response::from_parts(parts, body))
}

/// Read the full body; nothing has reached the caller yet, so a read error
/// still becomes an error status.
async fn framed_body<B>(body: B) -> GatewayResult<Body>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display,
{
    let collected = body.collect().await.map_err(|e| {
        GatewayError::transport(RpcCode::CLIENT_NET_ERR, format!("read backend body: {e}"))
    })?;
    let trailers = collected.trailers().cloned();
    let data = collected.to_bytes();

    Ok(match trailers {
        None => Body::from(data),
        Some(trailers) => Body::new(StreamBody::new(stream::iter([
            Ok::<_, Infallible>(Frame::data(data)),
            Ok(Frame::trailers(trailers)),
        ]))),
    })
}

fn frames(
    rx: mpsc::Receiver<Frame<Bytes>>,
) -> impl futures_util::Stream<Item = Result<Frame<Bytes>, Infallible>> + Send + 'static {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok(frame), rx))
    })
}

async fn copy_body<B>(
    mut body: B,
    writer: FlushWriter,
    announced: Vec<String>,
    request_id: &str,
) -> GatewayResult<()>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: fmt::Display,
{
    let mut trailers: Option<HeaderMap> = None;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Backend body read failed, ending stream");
                break;
            }
        };
        match frame.into_data() {
            Ok(data) => writer.write(data).await?,
            Err(frame) => {
                if let Ok(map) = frame.into_trailers() {
                    trailers.get_or_insert_with(HeaderMap::new).extend(map);
                }
            }
        }
    }

    if let Some(map) = &trailers {
        for name in map.keys() {
            if !announced.iter().any(|a| a == name.as_str()) {
                tracing::debug!(request_id = %request_id, trailer = %name, "Forwarding undeclared trailer");
            }
        }
    }

    writer.finish(trailers).await
}

fn caller_gone() -> GatewayError {
    GatewayError::transport(RpcCode::CLIENT_NET_ERR, "inbound connection closed while streaming")
}

/// Copy out the buffered bytes, leaving the buffer's full capacity in place
/// so it can go back to the pool.
fn drain(buf: &mut BytesMut) -> Bytes {
    let chunk = Bytes::copy_from_slice(&buf[..]);
    buf.clear();
    chunk
}

/// Writes data frames toward the caller according to the flush policy.
struct FlushWriter {
    tx: mpsc::Sender<Frame<Bytes>>,
    pending: Option<Arc<Mutex<BytesMut>>>,
    ticker: Option<JoinHandle<()>>,
    buffers: Arc<BufferPool>,
}

impl FlushWriter {
    fn new(tx: mpsc::Sender<Frame<Bytes>>, policy: FlushPolicy, buffers: Arc<BufferPool>) -> Self {
        let FlushPolicy::Periodic(interval) = policy else {
            return Self {
                tx,
                pending: None,
                ticker: None,
                buffers,
            };
        };

        let pending = Arc::new(Mutex::new(buffers.get()));
        let ticker = tokio::spawn({
            let pending = pending.clone();
            let tx = tx.clone();
            async move {
                let mut tick = tokio::time::interval(interval);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    let mut buf = pending.lock().await;
                    if buf.is_empty() {
                        continue;
                    }
                    let chunk = drain(&mut buf);
                    if tx.send(Frame::data(chunk)).await.is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            tx,
            pending: Some(pending),
            ticker: Some(ticker),
            buffers,
        }
    }

    async fn write(&self, data: Bytes) -> GatewayResult<()> {
        let Some(pending) = &self.pending else {
            return self.tx.send(Frame::data(data)).await.map_err(|_| caller_gone());
        };

        let mut buf = pending.lock().await;
        buf.extend_from_slice(&data);
        if buf.len() >= self.buffers.buffer_size() {
            let chunk = drain(&mut buf);
            self.tx.send(Frame::data(chunk)).await.map_err(|_| caller_gone())?;
        }
        Ok(())
    }

    async fn finish(mut self, trailers: Option<HeaderMap>) -> GatewayResult<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(pending) = self.pending.take() {
            let mut buf = pending.lock().await;
            if !buf.is_empty() {
                let chunk = drain(&mut buf);
                self.tx.send(Frame::data(chunk)).await.map_err(|_| caller_gone())?;
            }
            self.buffers.put(std::mem::take(&mut *buf));
        }
        if let Some(trailers) = trailers {
            self.tx
                .send(Frame::trailers(trailers))
                .await
                .map_err(|_| caller_gone())?;
        }
        Ok(())
    }
}

impl Drop for FlushWriter {
    fn drop(&mut self) {
        if let Some(ticker) = &self.ticker {
            ticker.abort();
        }
    }
}
