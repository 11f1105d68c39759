//! # Application State Management
//!
//! State handed to every HTTP handler and, through the upgrade handler, to
//! every WebSocket connection actor.
//!
//! ## What is shared:
//! - **Configuration**: read-only after startup, so a plain `Arc` is enough
//! - **Collaborators**: the sink factory and the transcription client, both
//!   stateless from the connection's point of view
//! - **Counters**: atomics used only for the health endpoint
//!
//! ## What is NOT shared:
//! Session state. Each connection actor owns its own session engine; there is
//! no global session table and no cross-connection locking.

use crate::audio::session::{SessionEngine, SessionLimits};
use crate::audio::sink::SinkFactory;
use crate::config::AppConfig;
use crate::origin::OriginPolicy;
use crate::transcription::Transcriber;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub origin_policy: Arc<OriginPolicy>,
    pub sinks: Arc<dyn SinkFactory>,
    pub transcriber: Arc<dyn Transcriber>,
    pub metrics: Arc<ConnectionMetrics>,
    /// When the server started (never changes)
    pub start_time: Instant,
}

/// Process-wide counters. Relaxed ordering is fine: these are only ever
/// reported, never used to make decisions.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
}

/// Point-in-time copy of [`ConnectionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
}

impl ConnectionMetrics {
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
        }
    }
}

impl AppState {
    /// Create the shared state, compiling the origin allow-list.
    pub fn new(
        config: AppConfig,
        sinks: Arc<dyn SinkFactory>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        let origin_policy = OriginPolicy::new(&config.stream.origin_patterns)
            .context("invalid origin pattern in stream.origin_patterns")?;

        Ok(Self {
            config: Arc::new(config),
            origin_policy: Arc::new(origin_policy),
            sinks,
            transcriber,
            metrics: Arc::new(ConnectionMetrics::default()),
            start_time: Instant::now(),
        })
    }

    /// A fresh engine, in Idle, for a newly accepted connection.
    pub fn new_engine(&self) -> SessionEngine {
        SessionEngine::new(
            self.sinks.clone(),
            self.transcriber.clone(),
            SessionLimits {
                max_session_bytes: self.config.stream.session_byte_limit(),
            },
        )
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
