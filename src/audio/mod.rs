//! # Audio Session Module
//!
//! Everything that happens to audio bytes between the socket and the
//! recognition backend.
//!
//! ## Key Components:
//! - **Codec**: whitelist of accepted encodings (`opus`, `aac`, `wav`)
//! - **Sink**: per-session byte destination (file in production)
//! - **Session Engine**: the per-connection Idle/Recording state machine
//!
//! Audio is never decoded or transcoded; chunks are persisted verbatim in
//! arrival order.

pub mod codec;
pub mod session;
pub mod sink;
