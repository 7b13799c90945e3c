pub mod auth;
pub mod chat;
pub mod health;
pub mod undo;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware, which resolves the owner).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/undo", post(undo::undo))
        .route_layer(middleware::from_fn_with_state(state, auth::require_owner));

    public.merge(protected)
}
