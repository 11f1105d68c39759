//! In-memory doubles for the sink and transcriber seams.
//!
//! Both doubles append to a shared [`Journal`] so tests can assert on the
//! exact order of creates, writes, closes and transcription calls.

use crate::audio::codec::Codec;
use crate::audio::sink::{AudioArtifact, AudioSink, SinkFactory};
use crate::transcription::client::Transcript;
use crate::transcription::{Transcriber, TranscriptionError};
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of collaborator calls shared between doubles.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of entries whose first word is `verb`.
    pub fn count(&self, verb: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.split(' ').next() == Some(verb))
            .count()
    }
}

/// Sink factory that keeps session bytes in memory.
#[derive(Debug, Clone)]
pub struct RecordingSinkFactory {
    journal: Journal,
    fail_create: bool,
    fail_write_after: Option<usize>,
}

impl RecordingSinkFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_create: false,
            fail_write_after: None,
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Accept `writes` chunks, then fail every later write.
    pub fn failing_write_after(mut self, writes: usize) -> Self {
        self.fail_write_after = Some(writes);
        self
    }
}

#[async_trait]
impl SinkFactory for RecordingSinkFactory {
    async fn create(&self, id: &str, codec: Codec) -> io::Result<Box<dyn AudioSink>> {
        if self.fail_create {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"));
        }
        self.journal.record(format!("create {}.{}", id, codec));

        Ok(Box::new(MemorySink {
            id: id.to_string(),
            codec,
            journal: self.journal.clone(),
            data: Vec::new(),
            writes: 0,
            fail_write_after: self.fail_write_after,
        }))
    }
}

struct MemorySink {
    id: String,
    codec: Codec,
    journal: Journal,
    data: Vec<u8>,
    writes: usize,
    fail_write_after: Option<usize>,
}

#[async_trait]
impl AudioSink for MemorySink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        if self.fail_write_after.is_some_and(|limit| self.writes >= limit) {
            return Err(io::Error::other("no space left on device"));
        }
        self.writes += 1;
        self.data.extend_from_slice(chunk);
        self.journal.record(format!("write {} {}", self.id, chunk.len()));
        Ok(chunk.len())
    }

    async fn close(&mut self) -> io::Result<AudioArtifact> {
        self.journal.record(format!("close {} {}", self.id, self.data.len()));
        Ok(AudioArtifact {
            id: self.id.clone(),
            codec: self.codec,
            path: format!("memory/{}.{}", self.id, self.codec).into(),
            bytes: self.data.len() as u64,
        })
    }
}

/// Transcriber returning a fixed outcome.
#[derive(Debug, Clone)]
pub struct ScriptedTranscriber {
    journal: Journal,
    outcome: Result<String, u16>,
}

impl ScriptedTranscriber {
    pub fn succeeding(journal: Journal, text: &str) -> Self {
        Self {
            journal,
            outcome: Ok(text.to_string()),
        }
    }

    /// Fail every call as if the backend answered with `status`.
    pub fn failing(journal: Journal, status: u16) -> Self {
        Self {
            journal,
            outcome: Err(status),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, artifact: &AudioArtifact) -> Result<Transcript, TranscriptionError> {
        self.journal
            .record(format!("transcribe {} {}", artifact.file_name(), artifact.bytes));

        match &self.outcome {
            Ok(text) => Ok(Transcript {
                text: text.clone(),
                elapsed: Duration::from_millis(120),
            }),
            Err(status) => Err(TranscriptionError::Status {
                status: *status,
                body: String::new(),
            }),
        }
    }
}
