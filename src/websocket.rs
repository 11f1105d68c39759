//! # WebSocket Audio Streaming Handler
//!
//! Accepts audio connections on the configured WebSocket path and runs one
//! [`AudioWebSocket`] actor per connection.
//!
//! ## WebSocket Protocol:
//! 1. **Handshake**: the `Origin` header is checked against the allow-list
//! 2. **Start**: `{"event":"start","id":"...","codec":"opus|aac|wav"}` opens a session
//! 3. **Audio Streaming**: binary frames are appended to the session sink
//! 4. **End**: `{"event":"end"}` closes the sink and returns the transcript
//! 5. **Repeat**: the connection returns to Idle and accepts a new `start`
//!
//! ## Ordering:
//! Frames are processed strictly one at a time. While a frame is being handled
//! (including the transcription call behind `end`) the actor waits on it with
//! `ctx.wait`, which pauses the socket stream; later frames queue up in the
//! transport and replies leave in processing order.
//!
//! ## Fragmentation:
//! Fragmented messages are reassembled before they reach the session engine,
//! so a fragmented binary message is one audio chunk and a fragmented text
//! message is one control envelope. A reassembled message larger than the
//! maximum frame size is treated like an oversized frame.
//!
//! ## Teardown:
//! The connection is closed when no text or binary frame arrives within the
//! idle timeout, on any transport/protocol error (including a frame larger
//! than the configured maximum) and when the client closes. Any open sink is
//! closed once on the way out.

use crate::audio::session::{Frame, SessionEngine};
use crate::error::AppError;
use crate::protocol::{Reply, SessionReply};
use crate::state::{AppState, ConnectionMetrics};

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::http::header;
use actix_web::web::BytesMut;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the idle deadline is checked, relative to the timeout.
fn idle_check_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).clamp(Duration::from_millis(50), Duration::from_secs(5))
}

/// actix reports a text frame that is not UTF-8 as an `Io` error carrying the
/// `Utf8Error` text. The frame has already been consumed, so the stream stays
/// usable.
fn is_undecodable_text(err: &ws::ProtocolError) -> bool {
    match err {
        ws::ProtocolError::Io(io) => io.to_string().contains("utf-8"),
        _ => false,
    }
}

/// A fragmented message being reassembled.
struct PartialMessage {
    binary: bool,
    buf: BytesMut,
}

impl PartialMessage {
    fn into_frame(self) -> Frame {
        if self.binary {
            return Frame::Binary(self.buf.freeze());
        }
        match String::from_utf8(self.buf.to_vec()) {
            Ok(text) => Frame::Text(text),
            Err(_) => Frame::InvalidText,
        }
    }
}

/// WebSocket actor owning one connection's session engine.
///
/// ## Actor Model:
/// Each connection is an independent actor; nothing about its session is
/// visible to other connections.
pub struct AudioWebSocket {
    /// Correlates log lines of one connection
    connection_id: Uuid,

    remote: Option<SocketAddr>,

    /// `None` only while a frame is being processed inside `ctx.wait`
    engine: Option<SessionEngine>,

    metrics: Arc<ConnectionMetrics>,

    idle_timeout: Duration,

    /// End of processing of the last text/binary frame
    last_frame: Instant,

    partial: Option<PartialMessage>,

    /// Upper bound for a reassembled message
    max_message_bytes: usize,
}

impl AudioWebSocket {
    pub fn new(state: &AppState, remote: Option<SocketAddr>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            remote,
            engine: Some(state.new_engine()),
            metrics: state.metrics.clone(),
            idle_timeout: state.config.stream.idle_timeout(),
            last_frame: Instant::now(),
            partial: None,
            max_message_bytes: state.config.stream.max_frame_bytes,
        }
    }

    /// Feed one fragment. Returns the complete frame once the final fragment
    /// arrives, or `Err(size)` when the message outgrows the frame limit.
    fn reassemble(&mut self, item: Item) -> Result<Option<Frame>, usize> {
        let (chunk, last) = match item {
            Item::FirstText(chunk) => {
                self.partial = Some(PartialMessage { binary: false, buf: BytesMut::new() });
                (chunk, false)
            }
            Item::FirstBinary(chunk) => {
                self.partial = Some(PartialMessage { binary: true, buf: BytesMut::new() });
                (chunk, false)
            }
            Item::Continue(chunk) => (chunk, false),
            Item::Last(chunk) => (chunk, true),
        };

        // The codec rejects a continuation without a first fragment.
        let Some(partial) = self.partial.as_mut() else {
            return Ok(Some(Frame::Unsupported));
        };

        let size = partial.buf.len() + chunk.len();
        if size > self.max_message_bytes {
            self.partial = None;
            return Err(size);
        }
        partial.buf.extend_from_slice(&chunk);
        self.last_frame = Instant::now();

        if !last {
            return Ok(None);
        }
        Ok(self.partial.take().map(PartialMessage::into_frame))
    }

    /// Hand one frame to the engine and block the socket stream until the
    /// engine is done with it.
    fn process(&mut self, frame: Frame, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(mut engine) = self.engine.take() else {
            error!(conn = %self.connection_id, "session engine missing, dropping connection");
            ctx.stop();
            return;
        };

        let work = async move {
            let reply = engine.handle_frame(frame).await;
            (engine, reply)
        };

        ctx.wait(work.into_actor(self).map(|(engine, reply), act, ctx| {
            act.engine = Some(engine);
            act.last_frame = Instant::now();

            if let Some(reply) = reply {
                act.record(&reply);
                if reply.is_error() {
                    debug!(conn = %act.connection_id, reply = %reply.to_json(), "rejecting frame");
                }
                ctx.text(reply.to_json());
            }
        }));
    }

    fn record(&self, reply: &Reply) {
        match reply {
            Reply::Session(SessionReply::Started { .. }) => self.metrics.session_started(),
            Reply::Session(SessionReply::Success { .. } | SessionReply::Error { .. }) => {
                self.metrics.session_completed()
            }
            Reply::Rejected { .. } => {}
        }
    }
}

impl Actor for AudioWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.metrics.connection_opened();
        info!(
            conn = %self.connection_id,
            remote = ?self.remote,
            "ws connected"
        );

        ctx.run_interval(idle_check_interval(self.idle_timeout), |act, ctx| {
            if act.last_frame.elapsed() >= act.idle_timeout {
                info!(
                    conn = %act.connection_id,
                    idle_secs = act.idle_timeout.as_secs(),
                    "ws idle timeout, closing connection"
                );
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Normal,
                    description: Some("idle timeout".to_string()),
                }));
                ctx.stop();
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.metrics.connection_closed();
        info!(conn = %self.connection_id, "ws disconnected");

        if let Some(mut engine) = self.engine.take() {
            tokio::spawn(async move {
                engine.shutdown().await;
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let frame = match msg {
            Ok(ws::Message::Text(text)) => Frame::Text(text.to_string()),
            Ok(ws::Message::Binary(data)) => Frame::Binary(data),
            Ok(ws::Message::Continuation(item)) => match self.reassemble(item) {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(size) => {
                    warn!(
                        conn = %self.connection_id,
                        size,
                        limit = self.max_message_bytes,
                        "fragmented message too large, closing connection"
                    );
                    ctx.close(Some(ws::CloseReason {
                        code: ws::CloseCode::Size,
                        description: Some("message too large".to_string()),
                    }));
                    ctx.stop();
                    return;
                }
            },
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                return;
            }
            Ok(ws::Message::Pong(_)) | Ok(ws::Message::Nop) => return,
            Ok(ws::Message::Close(reason)) => {
                info!(conn = %self.connection_id, reason = ?reason, "ws closed by client");
                ctx.close(reason);
                ctx.stop();
                return;
            }
            Err(err) if is_undecodable_text(&err) => {
                debug!(conn = %self.connection_id, error = %err, "text frame is not valid UTF-8");
                Frame::InvalidText
            }
            Err(err) => {
                warn!(conn = %self.connection_id, error = %err, "ws read ended");
                ctx.stop();
                return;
            }
        };

        self.process(frame, ctx);
    }
}

/// WebSocket endpoint handler.
///
/// Validates the origin, then upgrades the request with the configured
/// maximum frame size and starts a fresh [`AudioWebSocket`] in Idle.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let origin = match req.headers().get(header::ORIGIN) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::BadRequest("Origin header is not valid text".to_string()))?,
        ),
        None => None,
    };
    let host = req.connection_info().host().to_string();

    if let Err(err) = state.origin_policy.check(origin, Some(&host)) {
        warn!(origin = ?origin, host = %host, error = %err, "websocket upgrade rejected");
        return Err(err.into());
    }

    let actor = AudioWebSocket::new(&state, req.peer_addr());
    ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(state.config.stream.max_frame_bytes)
        .start()
}
