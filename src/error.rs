//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - [`AppError`]: failures of the HTTP surface (the WebSocket upgrade itself).
//!   These become HTTP responses through actix-web's `ResponseError` trait.
//! - [`StreamError`]: non-fatal failures inside a live audio connection. These
//!   never leave the protocol engine; each one is turned into a JSON reply on
//!   the socket and the connection stays open.
//!
//! Fatal connection conditions (idle timeout, transport failure) are not
//! errors in this sense: they simply stop the connection actor.

use crate::protocol::Reply;
use crate::transcription::TranscriptionError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::io;
use tracing::debug;

/// Errors returned before a WebSocket connection is established.
///
/// ## HTTP Status Code Mapping:
/// - BadRequest → 400 (e.g. an `Origin` header that is not a URL)
/// - Forbidden → 403 (origin not on the allow-list)
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Forbidden(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

/// All errors render as:
/// ```json
/// {"error": {"type": "forbidden", "message": "...", "timestamp": "2025-01-01T12:00:00Z"}}
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            AppError::BadRequest(_) => actix_web::http::StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => actix_web::http::StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::Forbidden(msg) => ("forbidden", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Client mistakes that leave the connection state untouched.
///
/// The `Display` text is exactly what the client receives in the `error`
/// field of the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("invalid control json")]
    InvalidControlJson,
    #[error("unsupported event")]
    UnsupportedEvent,
    #[error("missing id or codec")]
    MissingIdOrCodec,
    #[error("unsupported codec")]
    UnsupportedCodec,
    #[error("stream already active")]
    StreamAlreadyActive,
    #[error("no active stream")]
    NoActiveStream,
    #[error("no active stream for this binary frame")]
    BinaryWithoutStream,
    #[error("unsupported frame type")]
    UnsupportedFrame,
}

/// Non-fatal failures raised while handling a single frame.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error("failed to create sink")]
    SinkCreate(#[source] io::Error),

    #[error("failed to write chunk; stream closed")]
    SinkWrite(#[source] io::Error),

    #[error("failed to finalize stream")]
    SinkClose(#[source] io::Error),

    #[error("stream too large; closed")]
    LimitExceeded { written: u64, limit: u64 },

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

impl StreamError {
    /// Render the error as the reply sent back on the socket.
    ///
    /// Transcription failures are a session outcome (`status: error`);
    /// everything else is a plain protocol-level rejection.
    ///
    /// Details that stay off the wire (backend error bodies, byte counts) are
    /// logged here.
    pub fn into_reply(self) -> Reply {
        let message = self.to_string();
        match self {
            StreamError::Transcription(TranscriptionError::Status { status, body }) => {
                debug!(status, body = %body, "recognition backend error body");
                Reply::failed(message)
            }
            StreamError::Transcription(_) => Reply::failed(message),
            StreamError::LimitExceeded { written, limit } => {
                debug!(written, limit, "rejecting oversized stream");
                Reply::rejected(message)
            }
            _ => Reply::rejected(message),
        }
    }
}
