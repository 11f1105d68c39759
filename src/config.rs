//! # Configuration Management
//!
//! This module handles loading the server configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_STREAM__IDLE_TIMEOUT_SECS, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys use a double underscore so that field names containing a
//! single underscore survive: `APP_TRANSCRIPTION__BASE_URL` maps to
//! `transcription.base_url`. List values from the environment are comma
//! separated (`APP_STREAM__ORIGIN_PATTERNS=app.example.com,*.example.org`).
//!
//! Everything here is fixed at startup; connections never renegotiate it.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// ## Why separate config structs:
/// Each section maps to one collaborator: the HTTP listener, the per-connection
/// stream engine, and the recognition backend client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub transcription: TranscriptionConfig,
}

/// HTTP listener settings.
///
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any interface (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route serving the WebSocket upgrade
    pub ws_path: String,
}

/// Limits and policy applied to every audio connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Glob patterns matched against the `Origin` host (`"*"` allows all)
    pub origin_patterns: Vec<String>,
    /// Maximum silence between inbound frames before the connection is dropped
    pub idle_timeout_secs: u64,
    /// Largest single WebSocket frame accepted
    pub max_frame_bytes: usize,
    /// Cumulative bytes allowed per session; 0 disables the limit
    pub max_session_bytes: u64,
    /// Directory for session artifacts; empty means the system temp dir
    pub output_dir: String,
}

/// Recognition backend settings.
///
/// The recognition parameters are sent unchanged with every upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub response_format: String,
    pub temperature: f32,
    pub timestamp_granularities: Vec<String>,
    pub vad_filter: bool,
    /// Upper bound for one transcription request, upload included
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            ws_path: "/ws".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            origin_patterns: vec!["*".to_string()],
            idle_timeout_secs: 60,
            max_frame_bytes: 1 << 20, // 1 MiB
            max_session_bytes: 0,
            output_dir: String::new(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            model: "Systran/faster-whisper-tiny".to_string(),
            language: "pt".to_string(),
            response_format: "json".to_string(),
            temperature: 0.3,
            timestamp_granularities: vec!["segment".to_string()],
            vad_filter: true,
            timeout_secs: 60,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            stream: StreamConfig::default(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn session_byte_limit(&self) -> Option<u64> {
        (self.max_session_bytes > 0).then_some(self.max_session_bytes)
    }

    pub fn output_dir(&self) -> PathBuf {
        if self.output_dir.trim().is_empty() {
            env::temp_dir()
        } else {
            PathBuf::from(&self.output_dir)
        }
    }
}

impl TranscriptionConfig {
    /// Full URL of the OpenAI-compatible transcription route.
    pub fn endpoint(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_STREAM__MAX_SESSION_BYTES=52428800`: Cap sessions at 50 MiB
    /// - `APP_TRANSCRIPTION__LANGUAGE=en`: Change recognition language
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Optional config.toml next to the binary's working directory
            .add_source(config::File::with_name("config").required(false))
            // 3. APP_ prefixed environment variables
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stream.origin_patterns")
                    .with_list_parse_key("transcription.timestamp_granularities"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Origin patterns are checked separately when the origin policy is built,
    /// since only globset knows what a valid pattern is.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "WebSocket path must start with '/': {}",
                self.server.ws_path
            ));
        }

        if self.stream.idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Idle timeout must be greater than 0"));
        }

        if self.stream.max_frame_bytes == 0 {
            return Err(anyhow::anyhow!("Max frame size must be greater than 0"));
        }

        if self.transcription.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription base URL cannot be empty"));
        }

        if self.transcription.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Transcription timeout must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ws_path, "/ws");
        assert_eq!(config.stream.origin_patterns, vec!["*"]);
        assert_eq!(config.stream.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.stream.max_frame_bytes, 1_048_576);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.stream.idle_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.ws_path = "ws".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_limit_zero_means_unlimited() {
        let mut stream = StreamConfig::default();
        assert_eq!(stream.session_byte_limit(), None);

        stream.max_session_bytes = 4096;
        assert_eq!(stream.session_byte_limit(), Some(4096));
    }

    #[test]
    fn test_empty_output_dir_falls_back_to_temp() {
        let mut stream = StreamConfig::default();
        assert_eq!(stream.output_dir(), env::temp_dir());

        stream.output_dir = "/var/lib/scribe".to_string();
        assert_eq!(stream.output_dir(), PathBuf::from("/var/lib/scribe"));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let mut transcription = TranscriptionConfig::default();
        transcription.base_url = "http://speeches:8000/".to_string();
        assert_eq!(
            transcription.endpoint(),
            "http://speeches:8000/v1/audio/transcriptions"
        );
    }
}
