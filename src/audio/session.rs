//! # Audio Session Engine
//!
//! The per-connection state machine. One [`SessionEngine`] lives inside each
//! WebSocket actor and sees every inbound frame, one at a time.
//!
//! ## States:
//! - **Idle**: no active session; binary frames are rejected
//! - **Recording**: exactly one [`ActiveSession`] owns an open sink
//!
//! ## Transitions:
//! - Idle → Recording: valid `start` (sink created)
//! - Recording → Idle: `end` (sink closed, transcript requested),
//!   cumulative size limit crossed, or a sink write failure
//! - Recording → (gone): connection teardown via [`SessionEngine::shutdown`]
//!
//! A session's sink is closed by consuming the session, so every path out of
//! Recording closes it exactly once.

use crate::audio::codec::Codec;
use crate::audio::sink::{AudioArtifact, AudioSink, SinkFactory};
use crate::error::{ProtocolViolation, StreamError};
use crate::protocol::{ControlEnvelope, ControlEvent, Reply};
use crate::transcription::Transcriber;
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A frame as seen by the engine, independent of the transport.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Control envelope (JSON text)
    Text(String),
    /// Raw audio chunk
    Binary(Bytes),
    /// Text frame whose payload is not valid UTF-8
    InvalidText,
    /// Any other data frame the protocol does not use
    Unsupported,
}

/// The recording currently owned by a connection.
pub struct ActiveSession {
    pub id: String,
    pub codec: Codec,
    sink: Box<dyn AudioSink>,
    written: u64,
    pub opened_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn duration_seconds(&self) -> f64 {
        Utc::now()
            .signed_duration_since(self.opened_at)
            .num_milliseconds() as f64
            / 1000.0
    }

    /// Close the sink. Consumes the session so it cannot be closed twice.
    async fn finish(mut self) -> io::Result<AudioArtifact> {
        self.sink.close().await
    }
}

/// Per-connection state: a tagged union, never shared.
pub enum SessionState {
    Idle,
    Recording(ActiveSession),
}

/// Limits applied to every session on a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLimits {
    /// Cumulative bytes allowed per session (`None` = unlimited)
    pub max_session_bytes: Option<u64>,
}

/// Drives one connection's session lifecycle.
pub struct SessionEngine {
    state: SessionState,
    sinks: Arc<dyn SinkFactory>,
    transcriber: Arc<dyn Transcriber>,
    limits: SessionLimits,
}

impl SessionEngine {
    pub fn new(
        sinks: Arc<dyn SinkFactory>,
        transcriber: Arc<dyn Transcriber>,
        limits: SessionLimits,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            sinks,
            transcriber,
            limits,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording(_))
    }

    #[cfg(test)]
    pub fn active_session(&self) -> Option<&ActiveSession> {
        match &self.state {
            SessionState::Recording(session) => Some(session),
            SessionState::Idle => None,
        }
    }

    /// Process one inbound frame to completion.
    ///
    /// Returns the reply to send, or `None` when the frame was accepted
    /// silently (an audio chunk under the size limit).
    pub async fn handle_frame(&mut self, frame: Frame) -> Option<Reply> {
        let outcome = match frame {
            Frame::Text(text) => self.handle_control(&text).await.map(Some),
            Frame::Binary(chunk) => self.handle_chunk(&chunk).await.map(|_| None),
            Frame::InvalidText => Err(ProtocolViolation::InvalidControlJson.into()),
            Frame::Unsupported => Err(ProtocolViolation::UnsupportedFrame.into()),
        };

        match outcome {
            Ok(reply) => reply,
            Err(err) => Some(err.into_reply()),
        }
    }

    /// Close any open sink. Called once when the connection goes away.
    pub async fn shutdown(&mut self) {
        if let SessionState::Recording(session) = std::mem::replace(&mut self.state, SessionState::Idle) {
            let id = session.id.clone();
            let bytes = session.bytes_written();
            match session.finish().await {
                Ok(_) => info!(id = %id, bytes, "stream aborted by connection teardown"),
                Err(err) => error!(id = %id, error = %err, "failed to close sink on teardown"),
            }
        }
    }

    async fn handle_control(&mut self, text: &str) -> Result<Reply, StreamError> {
        let envelope =
            ControlEnvelope::parse(text).map_err(|_| ProtocolViolation::InvalidControlJson)?;

        match envelope.kind() {
            ControlEvent::Start => self.start(envelope).await,
            ControlEvent::End => self.end().await,
            ControlEvent::Unsupported => Err(ProtocolViolation::UnsupportedEvent.into()),
        }
    }

    async fn start(&mut self, envelope: ControlEnvelope) -> Result<Reply, StreamError> {
        if envelope.id.is_empty() || envelope.codec.is_empty() {
            return Err(ProtocolViolation::MissingIdOrCodec.into());
        }
        let codec: Codec = envelope
            .codec
            .parse()
            .map_err(|_| ProtocolViolation::UnsupportedCodec)?;
        if self.is_recording() {
            return Err(ProtocolViolation::StreamAlreadyActive.into());
        }

        let sink = self.sinks.create(&envelope.id, codec).await.map_err(|err| {
            error!(id = %envelope.id, codec = %codec, error = %err, "create sink failed");
            StreamError::SinkCreate(err)
        })?;

        let session = ActiveSession {
            id: envelope.id,
            codec,
            sink,
            written: 0,
            opened_at: Utc::now(),
        };
        info!(id = %session.id, codec = %session.codec, "stream started");

        let reply = Reply::started(session.id.clone());
        self.state = SessionState::Recording(session);
        Ok(reply)
    }

    async fn end(&mut self) -> Result<Reply, StreamError> {
        let session = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Recording(session) => session,
            SessionState::Idle => return Err(ProtocolViolation::NoActiveStream.into()),
        };

        let id = session.id.clone();
        let codec = session.codec;
        let bytes = session.bytes_written();
        let duration_sec = session.duration_seconds();

        let artifact = session.finish().await.map_err(|err| {
            error!(id = %id, error = %err, "close sink failed");
            StreamError::SinkClose(err)
        })?;
        info!(id = %id, codec = %codec, bytes, duration_sec, "stream ended");

        let transcript = self.transcriber.transcribe(&artifact).await.map_err(|err| {
            error!(id = %id, error = %err, "transcription failed");
            StreamError::Transcription(err)
        })?;

        let duration = transcript.elapsed_display();
        Ok(Reply::success(transcript.text, duration))
    }

    async fn handle_chunk(&mut self, chunk: &[u8]) -> Result<(), StreamError> {
        let SessionState::Recording(session) = &mut self.state else {
            return Err(ProtocolViolation::BinaryWithoutStream.into());
        };

        match session.sink.write(chunk).await {
            Ok(n) => session.written += n as u64,
            Err(err) => {
                error!(id = %session.id, error = %err, "sink write failed");
                // A truncated artifact is never transcribed.
                self.abort_session("write failure").await;
                return Err(StreamError::SinkWrite(err));
            }
        }

        if let Some(limit) = self.limits.max_session_bytes {
            if session.written > limit {
                let written = session.written;
                warn!(id = %session.id, bytes = written, limit, "stream exceeded max session bytes");
                self.abort_session("size limit").await;
                return Err(StreamError::LimitExceeded { written, limit });
            }
        }

        Ok(())
    }

    /// Leave Recording without transcribing, closing the sink.
    async fn abort_session(&mut self, reason: &str) {
        if let SessionState::Recording(session) = std::mem::replace(&mut self.state, SessionState::Idle) {
            let id = session.id.clone();
            if let Err(err) = session.finish().await {
                error!(id = %id, reason, error = %err, "failed to close aborted sink");
            }
        }
    }
}
