//! # Transcription Module
//!
//! Adapter between finished recordings and the external speech-recognition
//! service. The engine only depends on the [`Transcriber`] trait; the
//! production implementation is [`SpeechesClient`], which talks to an
//! OpenAI-compatible HTTP endpoint.

pub mod client;

pub use client::{SpeechesClient, Transcriber, TranscriptionError};
