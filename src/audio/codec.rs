//! # Audio Codec Whitelist
//!
//! Sessions declare the encoding of the bytes they are about to stream. Only a
//! fixed set of codecs is accepted; anything else is rejected before a sink
//! is ever created. The audio itself is never decoded here, the codec only
//! decides the artifact's file extension and is forwarded to the recognizer
//! through the file name.

use std::fmt;
use std::str::FromStr;

/// Audio encodings a client may declare in a `start` control message.
///
/// ## Parsing:
/// Matching is case-insensitive (`"WAV"`, `"Wav"` and `"wav"` are the same
/// codec); the canonical form is always lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Opus,
    Aac,
    Wav,
}

impl Codec {
    /// Lowercase name, also used as the artifact file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Opus => "opus",
            Codec::Aac => "aac",
            Codec::Wav => "wav",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a codec tag is not on the whitelist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported codec: {0}")]
pub struct UnsupportedCodec(pub String);

impl FromStr for Codec {
    type Err = UnsupportedCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opus" => Ok(Codec::Opus),
            "aac" => Ok(Codec::Aac),
            "wav" => Ok(Codec::Wav),
            _ => Err(UnsupportedCodec(s.to_string())),
        }
    }
}
