//! Chat API endpoint: the primary interface for running turns.
//!
//! - `POST /api/chat`: SSE stream of text deltas, tool activity and the
//!   terminal `done` event.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::auth::Owner;
use crate::runtime::{prepare_turn, spawn_turn, CancelOnDrop, CancelToken, ClientEvent, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    const MISSING: &str = "conversation_id and message are required";

    let Ok(Json(body)) = body else {
        return error(StatusCode::BAD_REQUEST, MISSING);
    };
    let conversation_id = body
        .conversation_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let message = body.message.filter(|m| !m.trim().is_empty());
    let (Some(conversation_id), Some(message)) = (conversation_id, message) else {
        return error(StatusCode::BAD_REQUEST, MISSING);
    };

    // Global turn cap: shed load rather than queue.
    let Ok(slot) = state.turn_slots.clone().try_acquire_owned() else {
        tracing::warn!(owner = %owner, "turn capacity exhausted");
        return error(
            StatusCode::SERVICE_UNAVAILABLE,
            "The assistant is busy right now. Please try again in a moment.",
        );
    };

    let lock = match state
        .conversation_locks
        .acquire(&owner, &conversation_id)
        .await
    {
        Ok(p) => p,
        Err(e) => return error(StatusCode::CONFLICT, &e.to_string()),
    };

    let input = TurnInput {
        owner_id: owner,
        conversation_id,
        message,
    };
    let turn = match prepare_turn(&state, input).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "failed to prepare turn");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to start the conversation turn");
        }
    };

    let cancel = CancelToken::new();
    // The turn task is detached: in-flight tools finish even if the client
    // goes away; the guard in the body stream stops everything after them.
    let (_handle, rx) = spawn_turn(state, turn, cancel.clone(), vec![lock, slot]);

    Sse::new(make_sse_stream(rx, cancel.drop_guard()))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn make_sse_stream(
    mut rx: mpsc::Receiver<ClientEvent>,
    guard: CancelOnDrop,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            yield Ok(Event::default().event(event.name()).data(event.data()));
        }
        // _guard is dropped here or when the client disconnects, which
        // cancels the turn.
    }
}
