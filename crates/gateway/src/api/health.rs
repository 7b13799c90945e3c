//! `GET /health`: store and provider readiness, no auth.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.store.ping().await {
        Ok(()) => serde_json::json!({ "ok": true }),
        Err(e) => {
            tracing::warn!(error = %e, "health: store ping failed");
            serde_json::json!({ "ok": false, "error": e.to_string() })
        }
    };
    let healthy = store["ok"].as_bool().unwrap_or(false);
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store,
        "provider": {
            "id": state.llm.provider_id(),
            "model": state.config.llm.model,
        },
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
