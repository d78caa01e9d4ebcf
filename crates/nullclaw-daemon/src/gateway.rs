//! Minimal HTTP surface: `/health`, `/status`, and `/chat`. Wire-level
//! gateway behavior beyond these endpoints is an external collaborator —
//! this thread exists so the orchestrator has something to supervise, so
//! operators have a liveness probe, and so a chat request has exactly one
//! front door into the provider router.
//!
//! Runs its own single-threaded Tokio runtime on a dedicated OS thread; it
//! is the only part of the daemon that uses async I/O. `Router::chat` is
//! blocking (it shells out to `reqwest::blocking`), so the `/chat` handler
//! runs it on `spawn_blocking` rather than stalling the runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use nullclaw_agent::Router;
use nullclaw_core::types::{ChatRequest, Message, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Clone)]
struct GatewayState {
    started_at: String,
    router: Arc<Router>,
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status_handler(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "started_at": state.started_at,
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("NULLCLAW_GIT_SHA"),
    }))
}

#[derive(Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatHttpRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    temperature: Option<f32>,
}

fn parse_role(s: &str) -> Role {
    match s {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

async fn chat_handler(
    State(state): State<GatewayState>,
    Json(body): Json<ChatHttpRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let messages = body
        .messages
        .into_iter()
        .map(|m| Message {
            role: parse_role(&m.role),
            content: m.content,
            name: None,
            tool_call_id: None,
        })
        .collect();
    let mut request = ChatRequest::new(messages, body.model);
    if let Some(temperature) = body.temperature {
        request.temperature = temperature;
    }

    let router = state.router.clone();
    let result = tokio::task::spawn_blocking(move || router.chat(&request))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("chat task panicked: {e}") })),
            )
        })?;

    match result {
        Ok(resp) => Ok(Json(json!({
            "text": resp.text,
            "model": resp.model,
            "usage": resp.usage,
        }))),
        Err(e) => {
            let status = if e.retriable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_GATEWAY
            };
            Err((status, Json(json!({ "error": e.to_string() }))))
        }
    }
}

fn build_router(state: GatewayState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/chat", post(chat_handler))
        .with_state(state)
}

/// Blocks the calling thread until `shutdown` is observed, running an Axum
/// server on an isolated single-threaded runtime.
pub fn run(addr: String, router: Arc<Router>, shutdown: Arc<AtomicBool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to build gateway runtime: {e}");
            return;
        }
    };

    runtime.block_on(async move {
        let state = GatewayState {
            started_at: chrono::Utc::now().to_rfc3339(),
            router,
        };
        let router = build_router(state);

        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("failed to bind gateway listener on {addr}: {e}");
                return;
            }
        };
        info!("gateway listening on {addr}");

        let shutdown_signal = async move {
            while !shutdown.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        };

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            error!("gateway server error: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_handler_reports_ok() {
        let resp = health_handler().await;
        assert_eq!(resp.0["status"], "ok");
    }

    fn empty_router() -> Arc<Router> {
        Arc::new(Router::new(Vec::new(), &[], &[], &[], 1, 0))
    }

    #[tokio::test]
    async fn status_handler_includes_version() {
        let state = GatewayState {
            started_at: "2024-01-01T00:00:00Z".to_string(),
            router: empty_router(),
        };
        let resp = status_handler(State(state)).await;
        assert_eq!(resp.0["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn chat_handler_errors_when_no_provider_slots_configured() {
        let state = GatewayState {
            started_at: "2024-01-01T00:00:00Z".to_string(),
            router: empty_router(),
        };
        let body = ChatHttpRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: None,
        };
        let result = chat_handler(State(state), Json(body)).await;
        assert!(result.is_err());
    }
}
