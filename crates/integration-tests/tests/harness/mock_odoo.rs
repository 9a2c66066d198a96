//! Mock Odoo backend for integration tests
//!
//! Speaks just enough of the JSON-RPC wire protocol for the connection
//! manager to authenticate and run calls. Behavior is scripted per
//! (model, method); a one-shot flag simulates session expiry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub struct MockOdoo {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

pub struct MockState {
    pub auth_count: AtomicU32,
    pub call_count: AtomicU32,
    /// When set, the next `call_kw` fails with JSON-RPC error code 100
    pub expire_next_call: AtomicBool,
}

impl MockOdoo {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            auth_count: AtomicU32::new(0),
            call_count: AtomicU32::new(0),
            expire_next_call: AtomicBool::new(false),
        });

        let app = Router::new()
            .route(
                "/web/session/authenticate",
                routing::post(handle_authenticate),
            )
            .route(
                "/web/dataset/call_kw/{model}/{method}",
                routing::post(handle_call_kw),
            )
            .route("/web/login", routing::get(handle_login_page))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }

    pub fn expire_next_call(&self) {
        self.state.expire_next_call.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for MockOdoo {
    fn drop(&mut self) {
        self.stop();
    }
}

fn rpc_result(id: Value, result: Value) -> Json<Value> {
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn handle_authenticate(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.auth_count.fetch_add(1, Ordering::SeqCst);
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let password = body
        .pointer("/params/password")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if password == "good" {
        rpc_result(
            id,
            json!({
                "uid": 2,
                "username": "svc",
                "name": "Service User",
                "server_version": "17.0",
                "server_version_info": [17, 0, 0, "final", 0],
            }),
        )
    } else {
        Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "odoo.exceptions.AccessDenied",
                    "message": "Access Denied",
                },
            },
        }))
    }
}

async fn handle_call_kw(
    State(state): State<Arc<MockState>>,
    Path((model, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.call_count.fetch_add(1, Ordering::SeqCst);
    let id = body.get("id").cloned().unwrap_or(Value::Null);

    if state.expire_next_call.swap(false, Ordering::SeqCst) {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": 100,
                "message": "Odoo Session Expired",
                "data": {"name": "odoo.http.SessionExpiredException"},
            },
        }));
    }

    match (model.as_str(), method.as_str()) {
        ("ir.module.module", "search_read") => {
            // The edition probe looks for web_enterprise; this instance is
            // community
            if body.to_string().contains("web_enterprise") {
                return rpc_result(id, json!([]));
            }
            rpc_result(
                id,
                json!([{"id": 1, "name": "base"}, {"id": 2, "name": "sale"}]),
            )
        }
        ("ir.model", "search_read") => rpc_result(id, json!([])),
        ("res.users", "search_count") => rpc_result(id, json!(1)),
        ("sale.order", "search_read") => rpc_result(
            id,
            json!([{"id": 1, "name": "S00001", "partner_id": [7, "Acme"], "state": "draft"}]),
        ),
        ("sale.order", "create") => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "odoo.exceptions.ValidationError",
                    "message": "Missing required fields: 'partner_id'",
                    "debug": "Traceback (most recent call last):\n  ...\nodoo.exceptions.ValidationError: Missing required fields: 'partner_id'",
                },
            },
        })),
        (_, "fields_get") => rpc_result(id, json!({})),
        (_, "search_read") => rpc_result(id, json!([])),
        (_, "search_count") => rpc_result(id, json!(0)),
        _ => rpc_result(id, json!(false)),
    }
}

async fn handle_login_page() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/html")],
        "<html><head><meta name=\"generator\" content=\"Odoo 17\"/></head></html>",
    )
}
