//! # Stream Scribe - Main Application Entry Point
//!
//! WebSocket audio ingest server. Clients open a socket, announce a stream
//! with a `start` control message, push binary audio chunks and finish with
//! `end`; the server stores the audio and replies with a transcript from an
//! OpenAI-compatible speech-to-text backend.
//!
//! ## Application Architecture:
//! - **config**: configuration (defaults, optional file, `APP_*` environment)
//! - **state**: shared collaborators and connection counters
//! - **origin**: WebSocket `Origin` allow-list
//! - **websocket**: upgrade handler and per-connection actor
//! - **protocol**: JSON control messages and replies
//! - **audio**: codecs, sinks and the per-connection session engine
//! - **transcription**: HTTP client for the recognition backend
//! - **health**: health endpoint
//! - **middleware**: request logging
//! - **error**: HTTP and stream error types

mod audio;
mod config;
mod error;
mod health;
mod middleware;
mod origin;
mod protocol;
mod state;
mod transcription;
mod websocket;

#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use audio::sink::FileSinkFactory;
use config::AppConfig;
use state::AppState;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::SpeechesClient;

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting stream-scribe v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        ws_path = %config.server.ws_path,
        "Configuration loaded"
    );

    let output_dir = config.stream.output_dir();
    let sinks = FileSinkFactory::new(&output_dir);
    let transcriber = SpeechesClient::from_config(&config.transcription)
        .context("failed to build transcription client")?;
    info!(
        output_dir = %output_dir.display(),
        endpoint = %transcriber.endpoint(),
        model = %config.transcription.model,
        "Audio pipeline ready"
    );

    let bind_addr = (config.server.host.clone(), config.server.port);
    let ws_path = config.server.ws_path.clone();
    let app_state = AppState::new(config, Arc::new(sinks), Arc::new(transcriber))?;

    info!("Starting HTTP server on {}:{}", bind_addr.0, bind_addr.1);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::RequestLogging)
            .route(&ws_path, web::get().to(websocket::audio_websocket))
            .service(
                // Browser dashboards poll health; the audio socket has its own origin check
                web::resource("/health")
                    .wrap(
                        Cors::default()
                            .allow_any_origin()
                            .allowed_methods(vec!["GET"])
                            .max_age(3600),
                    )
                    .route(web::get().to(health::health_check)),
            )
    })
    .disable_signals()
    .bind(bind_addr)
    .context("failed to bind HTTP server")?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_requested() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Logging setup. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_scribe=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to initialise tracing")?;

    Ok(())
}

/// Resolve once a shutdown signal arrives. Without signal handling the
/// server runs until the process is killed.
async fn shutdown_requested() {
    if let Err(e) = wait_for_shutdown().await {
        warn!("Signal handling unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Resolve on SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
