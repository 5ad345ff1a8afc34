//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! HTTP网关集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{setup_logging, RecordingSink};
use opscache::config::GatewayConfig;
use opscache::{Config, HttpGateway, Operation, ResourceGateway, Session, SyncError};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_config(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        base_url: format!("{}/api", server.uri()),
        timeout_ms: 2000,
        ..Default::default()
    }
}

async fn gateway_for(server: &MockServer) -> HttpGateway {
    setup_logging();
    HttpGateway::new(&gateway_config(server)).expect("gateway should build")
}

#[tokio::test]
async fn test_list_sends_params_as_query_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tickets"))
        .and(query_param("status", "open"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "t1" }])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let result = gateway
        .call("tickets", &Operation::List, &json!({ "status": "open", "page": 2 }))
        .await
        .unwrap();
    assert_eq!(result, json!([{ "id": "t1" }]));
}

#[tokio::test]
async fn test_get_update_delete_use_id_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/campaigns/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/campaigns/42"))
        .and(body_json(json!({ "id": 42, "name": "Spring" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42, "name": "Spring" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/campaigns/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let fetched = gateway
        .call("campaigns", &Operation::Get, &json!({ "id": 42 }))
        .await
        .unwrap();
    assert_eq!(fetched["id"], 42);

    gateway
        .call("campaigns", &Operation::Update, &json!({ "id": 42, "name": "Spring" }))
        .await
        .unwrap();

    let deleted = gateway
        .call("campaigns", &Operation::Delete, &json!({ "id": 42 }))
        .await
        .unwrap();
    assert_eq!(deleted, Value::Null);
}

#[tokio::test]
async fn test_action_paths_with_and_without_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions/s1/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "cancelled" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/reports/export"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let cancelled = gateway
        .call(
            "subscriptions",
            &Operation::Action("cancel".to_string()),
            &json!({ "id": "s1" }),
        )
        .await
        .unwrap();
    assert_eq!(cancelled["status"], "cancelled");

    gateway
        .call("reports", &Operation::Action("export".to_string()), &json!({}))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failures_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions/s1/cancel"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "message": "Subscription already cancelled" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/crm-alerts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let application = gateway
        .call(
            "subscriptions",
            &Operation::Action("cancel".to_string()),
            &json!({ "id": "s1" }),
        )
        .await
        .unwrap_err();
    assert_eq!(
        application,
        SyncError::Application {
            status: 409,
            message: "Subscription already cancelled".to_string(),
        }
    );

    let transport = gateway
        .call("crm-alerts", &Operation::List, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(transport, SyncError::Transport { status: Some(500), .. }));
}

#[tokio::test]
async fn test_missing_id_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let gateway = gateway_for(&server).await;

    let err = gateway
        .call("tickets", &Operation::Update, &json!({ "title": "no id" }))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidRequest(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/departments"))
        .and(header("authorization", "Bearer console-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = GatewayConfig {
        api_token: Some(SecretString::new("console-token".into())),
        ..gateway_config(&server)
    };
    let gateway = HttpGateway::new(&config).unwrap();
    gateway
        .call("departments", &Operation::List, &json!({}))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    setup_logging();
    let config = GatewayConfig {
        base_url: "http://127.0.0.1:9/api".to_string(),
        timeout_ms: 500,
        ..Default::default()
    };
    let gateway = HttpGateway::new(&config).unwrap();
    let err = gateway
        .call("tickets", &Operation::List, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport { status: None, .. }));
}

#[tokio::test]
async fn test_session_over_http_invalidates_after_comment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "t1", "comments": 0 })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ticket-comments"))
        .and(body_json(json!({ "ticketId": "t1", "body": "On it" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "c1" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        gateway: gateway_config(&server),
        ..Default::default()
    };
    let gateway = HttpGateway::new(&config.gateway).unwrap();
    let sink = RecordingSink::new();
    let session = Session::init(config, Arc::new(gateway), sink.clone()).unwrap();

    session.get("ticket", "tickets", "t1").await;
    session.get("ticket", "tickets", "t1").await;
    session
        .mutate("tickets.addComment", json!({ "ticketId": "t1", "body": "On it" }))
        .await
        .unwrap();
    let refreshed = session.get("ticket", "tickets", "t1").await;
    assert_eq!(refreshed.data.unwrap()["id"], "t1");
    assert_eq!(sink.messages(), vec!["Comment added".to_string()]);
}
