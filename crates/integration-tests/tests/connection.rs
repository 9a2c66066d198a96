//! Connection-layer scenarios against the mock backend

mod harness;

use std::sync::atomic::Ordering;

use harness::mock_odoo::MockOdoo;
use odoo_mcp_config::OdooMcpConfig;
use odoo_mcp_connection::{ConnectionManager, ConnectionState, detect_version};
use odoo_mcp_core::WireProtocol;
use secrecy::SecretString;
use serde_json::{Map, json};

fn config_for(url: &str) -> OdooMcpConfig {
    let raw = json!({
        "connection": {
            "url": url,
            "database": "test",
            "username": "svc",
            "password": "good",
        },
    });
    serde_json::from_value(raw).expect("valid config")
}

#[tokio::test]
async fn connects_and_selects_jsonrpc_for_17() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let manager = ConnectionManager::new(config_for(&mock.url()));

    manager.connect().await.expect("connects");
    assert_eq!(manager.state(), ConnectionState::Ready);

    let info = manager.connection_info().await;
    assert_eq!(info.protocol, Some(WireProtocol::Jsonrpc));
    assert_eq!(info.uid, Some(2));
    assert_eq!(info.odoo_version.as_deref(), Some("17.0"));
    assert!(info.installed_modules.contains(&"sale".to_owned()));

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn session_expiry_reconnects_and_retries_once() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let manager = ConnectionManager::new(config_for(&mock.url()));
    manager.connect().await.expect("connects");

    let auths_after_connect = mock.state().auth_count.load(Ordering::SeqCst);

    // The next call gets a session-expired fault; the manager must
    // re-authenticate and reissue the call, surfacing no error.
    mock.expire_next_call();
    let result = manager
        .execute_kw(
            "sale.order",
            "search_read",
            vec![json!([])],
            Map::new(),
            None,
        )
        .await
        .expect("retried transparently");

    let rows = result.as_array().expect("rows");
    assert_eq!(rows[0]["name"], json!("S00001"));
    assert_eq!(manager.state(), ConnectionState::Ready);
    assert!(
        mock.state().auth_count.load(Ordering::SeqCst) > auths_after_connect,
        "reconnection must re-authenticate"
    );
}

#[tokio::test]
async fn bad_credentials_fail_fatally() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let mut config = config_for(&mock.url());
    config.connection.password = Some(SecretString::from("wrong".to_owned()));

    let manager = ConnectionManager::new(config);
    let err = manager.connect().await.expect_err("must fail");
    assert!(err.to_string().to_lowercase().contains("auth"));
    assert_eq!(manager.state(), ConnectionState::Error);
}

#[tokio::test]
async fn all_probes_failing_assumes_14_and_xmlrpc() {
    // A server with no recognizable endpoints at all
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("binds");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, axum::Router::new()).await.ok();
    });

    let version = detect_version(&format!("http://{addr}"), "", "", "", 5, true, None).await;
    assert_eq!(version.major, 14);
    assert_eq!(version.recommended_protocol(), WireProtocol::Xmlrpc);
    assert_eq!(version.full_string, "14.0 (assumed)");
}
