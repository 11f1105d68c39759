use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /health`: liveness plus connection and session counters.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics.snapshot();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port,
            "ws_path": config.server.ws_path
        },
        "connections": {
            "active": metrics.connections_active,
            "total": metrics.connections_total
        },
        "sessions": {
            "started": metrics.sessions_started,
            "completed": metrics.sessions_completed
        },
        "stream": {
            "idle_timeout_secs": config.stream.idle_timeout_secs,
            "max_frame_bytes": config.stream.max_frame_bytes,
            "max_session_bytes": config.stream.session_byte_limit()
        }
    }))
}
