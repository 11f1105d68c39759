//! # Recognition Backend Client
//!
//! Uploads one finished recording to an OpenAI-compatible
//! `/v1/audio/transcriptions` endpoint and extracts the transcript.
//!
//! ## Request Shape:
//! A single `multipart/form-data` POST carrying the fixed recognition
//! parameters (`model`, `language`, `response_format`, `temperature`,
//! `timestamp_granularities[]`, `vad_filter`) and the audio as the `file` part.
//!
//! ## Success Criteria:
//! Any 2xx response whose body is JSON with a string `text` field. Everything
//! else (transport failure, timeout, non-2xx, unparseable body) is a
//! [`TranscriptionError`]. There are no retries at this layer.

use crate::audio::sink::AudioArtifact;
use crate::config::TranscriptionConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Text returned by the backend and how long the call took.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub elapsed: Duration,
}

impl Transcript {
    /// Elapsed time rendered for the client reply (e.g. `1.204s`, `850ms`).
    pub fn elapsed_display(&self) -> String {
        format!("{:?}", self.elapsed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("open artifact: {0}")]
    Artifact(#[source] io::Error),

    #[error("http post: {0}")]
    Request(#[from] reqwest::Error),

    #[error("read body: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("non-2xx: {status}")]
    Status { status: u16, body: String },

    #[error("invalid transcription response: {0}")]
    InvalidBody(String),
}

/// Turns a finished recording into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, artifact: &AudioArtifact) -> Result<Transcript, TranscriptionError>;
}

/// Fixed recognition parameters sent with every upload.
#[derive(Debug, Clone)]
pub struct RecognitionParams {
    pub model: String,
    pub language: String,
    pub response_format: String,
    pub temperature: f32,
    pub timestamp_granularities: Vec<String>,
    pub vad_filter: bool,
}

impl From<&TranscriptionConfig> for RecognitionParams {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            model: config.model.clone(),
            language: config.language.clone(),
            response_format: config.response_format.clone(),
            temperature: config.temperature,
            timestamp_granularities: config.timestamp_granularities.clone(),
            vad_filter: config.vad_filter,
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionBody {
    text: String,
}

/// HTTP client for a faster-whisper style speech server.
#[derive(Debug, Clone)]
pub struct SpeechesClient {
    http: reqwest::Client,
    endpoint: String,
    params: RecognitionParams,
}

impl SpeechesClient {
    /// Build a client from configuration. The request timeout bounds the whole
    /// call, upload included.
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            params: RecognitionParams::from(config),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(&self, artifact: &AudioArtifact, audio: Vec<u8>) -> Form {
        let mut form = Form::new()
            .text("model", self.params.model.clone())
            .text("language", self.params.language.clone())
            .text("response_format", self.params.response_format.clone())
            .text("temperature", self.params.temperature.to_string());

        for granularity in &self.params.timestamp_granularities {
            form = form.text("timestamp_granularities[]", granularity.clone());
        }

        form.text("vad_filter", self.params.vad_filter.to_string())
            .part("file", Part::bytes(audio).file_name(artifact.file_name()))
    }
}

#[async_trait]
impl Transcriber for SpeechesClient {
    async fn transcribe(&self, artifact: &AudioArtifact) -> Result<Transcript, TranscriptionError> {
        let audio = tokio::fs::read(&artifact.path)
            .await
            .map_err(TranscriptionError::Artifact)?;
        let form = self.build_form(artifact, audio);

        let started = Instant::now();
        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let elapsed = started.elapsed();

        let status = response.status();
        let body = response.bytes().await.map_err(TranscriptionError::ReadBody)?;

        if !status.is_success() {
            warn!(
                id = %artifact.id,
                status = status.as_u16(),
                "recognition backend rejected upload"
            );
            return Err(TranscriptionError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        debug!(id = %artifact.id, body = %String::from_utf8_lossy(&body), "recognition response");

        let parsed: TranscriptionBody = serde_json::from_slice(&body)
            .map_err(|e| TranscriptionError::InvalidBody(e.to_string()))?;

        info!(
            id = %artifact.id,
            bytes = artifact.bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            chars = parsed.text.len(),
            "transcription completed"
        );

        Ok(Transcript {
            text: parsed.text,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::Codec;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> TranscriptionConfig {
        TranscriptionConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            ..TranscriptionConfig::default()
        }
    }

    fn artifact_in(dir: &tempfile::TempDir, bytes: &[u8]) -> AudioArtifact {
        let path = dir.path().join("take-1.wav");
        std::fs::write(&path, bytes).unwrap();
        AudioArtifact {
            id: "take-1".to_string(),
            codec: Codec::Wav,
            path,
            bytes: bytes.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_successful_transcription_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(body_string_contains("Systran/faster-whisper-tiny"))
            .and(body_string_contains("timestamp_granularities[]"))
            .and(body_string_contains("filename=\"take-1.wav\""))
            .and(body_string_contains("fake-audio"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "olá mundo" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = SpeechesClient::from_config(&config_for(&server)).unwrap();
        let transcript = client.transcribe(&artifact_in(&dir, b"fake-audio")).await.unwrap();

        assert_eq!(transcript.text, "olá mundo");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = SpeechesClient::from_config(&config_for(&server)).unwrap();
        let err = client.transcribe(&artifact_in(&dir, b"x")).await.unwrap_err();

        match &err {
            TranscriptionError::Status { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "non-2xx: 500");
    }

    #[tokio::test]
    async fn test_body_without_text_field_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "segments": [] })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = SpeechesClient::from_config(&config_for(&server)).unwrap();
        let err = client.transcribe(&artifact_in(&dir, b"x")).await.unwrap_err();

        assert!(matches!(err, TranscriptionError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SpeechesClient::from_config(&config_for(&server)).unwrap();
        let artifact = AudioArtifact {
            id: "gone".to_string(),
            codec: Codec::Opus,
            path: "/nonexistent/gone.opus".into(),
            bytes: 0,
        };

        let err = client.transcribe(&artifact).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::Artifact(_)));
    }

    #[tokio::test]
    async fn test_truncated_response_body_is_a_read_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        // Accept the whole upload, promise 100 bytes of body and hang up early.
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !(request.ends_with(b"--\r\n") || request.ends_with(b"0\r\n\r\n")) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n{\"te")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let config = TranscriptionConfig {
            base_url,
            timeout_secs: 5,
            ..TranscriptionConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let client = SpeechesClient::from_config(&config).unwrap();
        let err = client.transcribe(&artifact_in(&dir, b"x")).await.unwrap_err();

        assert!(matches!(err, TranscriptionError::ReadBody(_)), "got {err:?}");
        assert!(err.to_string().starts_with("read body: "));
    }
}
