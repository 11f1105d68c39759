//! # WebSocket Wire Messages
//!
//! JSON shapes exchanged over the audio socket.
//!
//! ## Client → Server (text frames):
//! ```json
//! {"event": "start", "id": "meeting-42", "codec": "opus"}
//! {"event": "end"}
//! ```
//! Binary frames carry raw audio and have no envelope.
//!
//! ## Server → Client (text frames):
//! ```json
//! {"status": "started", "id": "meeting-42"}
//! {"status": "success", "transcript": "...", "duration": "1.52s"}
//! {"status": "error", "error": "non-2xx: 500"}
//! {"error": "no active stream"}
//! ```

use serde::{Deserialize, Serialize};

/// Session lifecycle control message.
///
/// Every field defaults to an empty string so that a missing field is
/// reported as a protocol problem ("unsupported event", "missing id or
/// codec") instead of a JSON error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ControlEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub codec: String,
}

/// Recognised control events (matched case-insensitively).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Start,
    End,
    Unsupported,
}

impl ControlEnvelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> ControlEvent {
        match self.event.to_ascii_lowercase().as_str() {
            "start" => ControlEvent::Start,
            "end" => ControlEvent::End,
            _ => ControlEvent::Unsupported,
        }
    }
}

/// Session outcome replies, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionReply {
    Started { id: String },
    Success { transcript: String, duration: String },
    Error { error: String },
}

/// Everything the server writes back on the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Session(SessionReply),
    /// Protocol-level rejection not tied to a session outcome
    Rejected { error: String },
}

impl Reply {
    pub fn started(id: impl Into<String>) -> Self {
        Reply::Session(SessionReply::Started { id: id.into() })
    }

    pub fn success(transcript: impl Into<String>, duration: impl Into<String>) -> Self {
        Reply::Session(SessionReply::Success {
            transcript: transcript.into(),
            duration: duration.into(),
        })
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Reply::Session(SessionReply::Error { error: error.into() })
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Reply::Rejected { error: error.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Reply::Rejected { .. } | Reply::Session(SessionReply::Error { .. })
        )
    }

    pub fn to_json(&self) -> String {
        // Only string fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
    }
}
