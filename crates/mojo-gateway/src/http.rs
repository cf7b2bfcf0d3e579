//! HTTP transport (`--mode http`): a small Axum router exposing the same
//! MCP tool surface as the stdio transport over `/mcp/tools` and
//! `/mcp/call`, plus `/health`. Router shape and bearer-token check
//! grounded on the teacher's `build_router`/`chat::check_auth`
//! (`skynet-gateway/src/app.rs`, `src/http/chat.rs`).

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::tools::{execute_tool, tool_definitions};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/mcp/tools", get(list_tools_handler))
        .route("/mcp/call", post(call_tool_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.server.environment,
        "scheduler_daemon_running": state.scheduler.is_running(),
    }))
}

async fn list_tools_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&state, &headers)?;
    Ok(Json(json!({ "tools": tool_definitions() })))
}

#[derive(Deserialize)]
struct CallToolRequest {
    name: String,
    #[serde(default)]
    arguments: Value,
}

async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CallToolRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&state, &headers)?;

    match execute_tool(&state, &req.name, &req.arguments).await {
        Ok(value) => Ok(Json(value)),
        Err(err) => {
            let status = match err.code() {
                "AuthError" => StatusCode::UNAUTHORIZED,
                "ValidationError" => StatusCode::BAD_REQUEST,
                "NotFoundError" => StatusCode::NOT_FOUND,
                "ConflictError" => StatusCode::CONFLICT,
                "TimeoutError" => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(err.to_envelope())))
        }
    }
}

/// Bearer-token check against `config.auth.mcp_api_key`, only enforced
/// when `config.auth.mcp_require_auth` is set — mirrors the teacher's
/// token-mode `check_auth`, minus the other auth modes that only apply to
/// its WebSocket path.
fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    if !state.config.auth.mcp_require_auth {
        return Ok(());
    }
    let expected = state.config.auth.mcp_api_key.as_deref();
    let provided = extract_bearer(headers);

    match (expected, provided) {
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "code": "AuthError", "message": "missing or invalid bearer token" } })),
        )),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "))
}
