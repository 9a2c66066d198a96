//! MCP transports
//!
//! stdio (NDJSON over stdin/stdout, the default), SSE on `/sse`, and
//! streamable HTTP on a configurable path. Logging goes to stderr; stdout
//! belongs to the protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::JsonRpcNotification;
use crate::server::McpServer;

/// Wrap a changed resource URI into the MCP notification line
fn updated_notification(uri: &str) -> Option<String> {
    let notification = JsonRpcNotification::new(
        "notifications/resources/updated",
        Some(json!({"uri": uri})),
    );
    serde_json::to_string(&notification).ok()
}

/// Run the stdio transport until EOF or cancellation
///
/// Requests are handled in arrival order; subscription notifications are
/// interleaved between responses on stdout.
pub async fn run_stdio(
    server: Arc<McpServer>,
    mut notifications: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("stdio transport cancelled");
                return Ok(());
            }
            changed = notifications.recv() => {
                let Some(uri) = changed else { continue };
                if let Some(line) = updated_notification(&uri) {
                    stdout.write_all(line.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed, shutting down");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(response) = server.handle_line(&line, "stdio").await {
                    stdout.write_all(response.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
        }
    }
}

// -- streamable HTTP --

struct HttpState {
    server: Arc<McpServer>,
}

/// Run the streamable HTTP transport
pub async fn run_http(
    server: Arc<McpServer>,
    host: &str,
    port: u16,
    path: &str,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let state = Arc::new(HttpState { server });
    let app = Router::new()
        .route(path, post(handle_http_request))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, path, "streamable HTTP transport listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn handle_http_request(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let session = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http")
        .to_owned();

    match state.server.handle_line(&body, &session).await {
        Some(response) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            response,
        )
            .into_response(),
        // Notifications get acknowledged without a body
        None => StatusCode::ACCEPTED.into_response(),
    }
}

// -- SSE --

struct SseState {
    server: Arc<McpServer>,
    sessions: std::sync::Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    next_session: AtomicU64,
}

/// Run the SSE transport: streams on GET `/sse`, requests on POST `/sse`
pub async fn run_sse(
    server: Arc<McpServer>,
    host: &str,
    port: u16,
    mut notifications: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let state = Arc::new(SseState {
        server,
        sessions: std::sync::Mutex::new(HashMap::new()),
        next_session: AtomicU64::new(1),
    });

    // Fan subscription notifications out to every connected stream
    let fanout_state = Arc::clone(&state);
    let fanout_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = fanout_cancel.cancelled() => return,
                changed = notifications.recv() => {
                    let Some(uri) = changed else { return };
                    let Some(line) = updated_notification(&uri) else { continue };
                    let sessions = fanout_state.sessions.lock().expect("sessions lock");
                    for sender in sessions.values() {
                        let _ = sender.send(line.clone());
                    }
                }
            }
        }
    });

    let app = Router::new()
        .route("/sse", get(handle_sse_stream).post(handle_sse_request))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, "SSE transport listening on /sse");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

#[derive(serde::Deserialize)]
struct SseQuery {
    #[serde(default)]
    session: Option<String>,
}

async fn handle_sse_stream(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    let session = format!("sse-{}", state.next_session.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    state
        .sessions
        .lock()
        .expect("sessions lock")
        .insert(session.clone(), tx);
    tracing::info!(session = %session, "SSE client connected");

    let endpoint = format!("/sse?session={session}");
    let stream = futures_util::stream::unfold(
        (rx, Some(endpoint)),
        |(mut rx, endpoint)| async move {
            if let Some(endpoint) = endpoint {
                let event = Event::default().event("endpoint").data(endpoint);
                return Some((Ok::<_, std::convert::Infallible>(event), (rx, None)));
            }
            let line = rx.recv().await?;
            Some((
                Ok(Event::default().event("message").data(line)),
                (rx, None),
            ))
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn handle_sse_request(
    State(state): State<Arc<SseState>>,
    Query(query): Query<SseQuery>,
    body: String,
) -> impl IntoResponse {
    let Some(session) = query.session else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing session query parameter"})),
        )
            .into_response();
    };

    let response = state.server.handle_line(&body, &session).await;
    if let Some(response) = response {
        let sender = state
            .sessions
            .lock()
            .expect("sessions lock")
            .get(&session)
            .cloned();
        match sender {
            Some(sender) => {
                let _ = sender.send(response);
            }
            None => {
                // Stream is gone; drop the client's subscriptions with it
                let resources = Arc::clone(state.server.resources());
                let session = session.clone();
                tokio::spawn(async move {
                    resources.unsubscribe_client(&session).await;
                });
                return StatusCode::GONE.into_response();
            }
        }
    }
    StatusCode::ACCEPTED.into_response()
}
