//! # Session Sinks
//!
//! A sink is the destination for one session's raw audio bytes. The engine
//! only ever talks to the [`SinkFactory`] and [`AudioSink`] traits, so the
//! state machine can be exercised with an in-memory double while production
//! writes to disk.
//!
//! ## Lifecycle:
//! 1. **create**: `SinkFactory::create(id, codec)` allocates the destination
//! 2. **write**: ordered appends, one per binary frame
//! 3. **close**: flushes everything and hands back the finished [`AudioArtifact`]
//!
//! The transcription client reads the artifact produced by `close`, so a sink
//! must make every prior write durable before `close` returns.

use crate::audio::codec::Codec;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// A finished, closed recording ready to be handed to a transcriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    /// Client-supplied session identifier
    pub id: String,
    pub codec: Codec,
    /// Where the bytes were persisted
    pub path: PathBuf,
    /// Total bytes the sink accepted
    pub bytes: u64,
}

impl AudioArtifact {
    /// File name presented to the recognition backend (`<id>.<codec>`).
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.codec.extension())
    }
}

/// Creates one sink per recording session.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn create(&self, id: &str, codec: Codec) -> io::Result<Box<dyn AudioSink>>;
}

/// Sequential byte writer bound to a single session.
#[async_trait]
pub trait AudioSink: Send {
    /// Append `chunk`, returning how many bytes were actually written.
    async fn write(&mut self, chunk: &[u8]) -> io::Result<usize>;

    /// Flush and release the destination.
    ///
    /// Callers close a sink at most once; the engine guarantees this by
    /// consuming the session that owns the sink.
    async fn close(&mut self) -> io::Result<AudioArtifact>;
}

/// Writes each session to `<dir>/<id>.<codec>`.
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
}

impl FileSinkFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Session ids end up in file names, so anything that could escape the
/// output directory is refused.
fn validate_file_id(id: &str) -> io::Result<()> {
    let escapes = id.is_empty()
        || id.starts_with('.')
        || id.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        || id.contains("..");

    if escapes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("session id {:?} is not usable as a file name", id),
        ));
    }
    Ok(())
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn create(&self, id: &str, codec: Codec) -> io::Result<Box<dyn AudioSink>> {
        validate_file_id(id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(format!("{}.{}", id, codec.extension()));
        let file = File::create(&path).await?;
        debug!(path = %path.display(), "sink file created");

        Ok(Box::new(FileSink {
            id: id.to_string(),
            codec,
            path,
            writer: BufWriter::new(file),
            written: 0,
        }))
    }
}

struct FileSink {
    id: String,
    codec: Codec,
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

#[async_trait]
impl AudioSink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(chunk.len())
    }

    async fn close(&mut self) -> io::Result<AudioArtifact> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;

        Ok(AudioArtifact {
            id: self.id.clone(),
            codec: self.codec,
            path: self.path.clone(),
            bytes: self.written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_persists_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FileSinkFactory::new(dir.path());

        let mut sink = factory.create("call-1", Codec::Wav).await.unwrap();
        assert_eq!(sink.write(b"RIFF").await.unwrap(), 4);
        assert_eq!(sink.write(b"data").await.unwrap(), 4);
        let artifact = sink.close().await.unwrap();

        assert_eq!(artifact.path, dir.path().join("call-1.wav"));
        assert_eq!(artifact.bytes, 8);
        assert_eq!(artifact.file_name(), "call-1.wav");
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn test_file_sink_creates_missing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sessions").join("today");
        let factory = FileSinkFactory::new(&nested);

        let mut sink = factory.create("a", Codec::Opus).await.unwrap();
        sink.close().await.unwrap();

        assert!(nested.join("a.opus").exists());
    }

    #[tokio::test]
    async fn test_file_sink_refuses_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FileSinkFactory::new(dir.path());

        for id in ["../escape", "nested/id", ".hidden", "back\\slash"] {
            let err = factory.create(id, Codec::Wav).await.err().unwrap();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "id {:?}", id);
        }
    }
}
