//! `POST /api/undo`: reverse one undo action offered in a `done` event.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use hb_tools::UndoRequest;

use super::auth::Owner;
use crate::state::AppState;

pub async fn undo(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    body: Result<Json<UndoRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid request body" })),
        )
            .into_response();
    };

    match state.undo.reverse(&owner, &req).await {
        Ok(message) => Json(serde_json::json!({ "success": true, "message": message }))
            .into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            tracing::info!(owner = %owner, kind = %req.kind, error = %e, "undo rejected");
            (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
    }
}
