//! HTTP surface integration tests over the in-memory store

use std::sync::Arc;

use agentwallet_api::{create_router, AppState};
use agentwallet_engine::{Engine, TracingNotifier};
use agentwallet_store::{MemStore, Store};
use agentwallet_types::{Money, Owner, OwnerId};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    owner_key: String,
}

async fn app() -> TestApp {
    let store = Arc::new(MemStore::new());
    let owner = Owner {
        id: OwnerId::new(),
        api_key: "awo_test-owner-key".to_string(),
        name: "test-owner".to_string(),
        contact: None,
        created_at: Utc::now(),
    };
    store.create_owner(&owner).await.unwrap();

    let engine = Engine::new(store, Arc::new(TracingNotifier));
    let state = Arc::new(AppState::new(engine));
    TestApp {
        router: create_router(state),
        owner_key: owner.api_key,
    }
}

async fn request(
    app: &TestApp,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn missing_credential_is_401() {
    let app = app().await;
    let (status, _) = request(&app, "GET", "/agents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_credential_cannot_create_agents() {
    let app = app().await;
    let (status, agent) = request(
        &app,
        "POST",
        "/agents",
        Some(&app.owner_key),
        Some(json!({ "name": "worker" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let agent_key = agent["api_key"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "POST",
        "/agents",
        Some(&agent_key),
        Some(json!({ "name": "nested" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn full_spend_flow_over_http() {
    let app = app().await;

    // Owner creates agent and wallet, funds it
    let (_, agent) = request(
        &app,
        "POST",
        "/agents",
        Some(&app.owner_key),
        Some(json!({ "name": "spender" })),
    )
    .await;
    let agent_id = agent["id"].as_str().unwrap().to_string();
    let agent_key = agent["api_key"].as_str().unwrap().to_string();

    let (status, wallet) = request(
        &app,
        "POST",
        "/wallets",
        Some(&app.owner_key),
        Some(json!({ "agent_id": agent_id, "currency": "USD" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let wallet_id = wallet["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "POST",
        &format!("/wallets/{wallet_id}/deposit"),
        Some(&app.owner_key),
        Some(json!({ "amount": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Rules: approval threshold 75, per-transaction cap 200
    let (status, _) = request(
        &app,
        "POST",
        &format!("/wallets/{wallet_id}/rules"),
        Some(&app.owner_key),
        Some(json!({ "kind": "approval_threshold", "threshold": "75", "priority": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = request(
        &app,
        "POST",
        &format!("/wallets/{wallet_id}/rules"),
        Some(&app.owner_key),
        Some(json!({ "kind": "per_transaction_limit", "limit": "200", "priority": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Agent submits 80: held for approval (202), balance unchanged
    let (status, tx) = request(
        &app,
        "POST",
        &format!("/wallets/{wallet_id}/transactions"),
        Some(&agent_key),
        Some(json!({ "amount": 80, "category": "advertising" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let tx_id = tx["id"].as_str().unwrap().to_string();

    let (_, balance) = request(
        &app,
        "GET",
        &format!("/wallets/{wallet_id}/balance"),
        Some(&agent_key),
        None,
    )
    .await;
    assert_eq!(balance["balance"], json!("1000.00"));

    // Owner approves: completed, balance 920
    let (status, approved) = request(
        &app,
        "POST",
        &format!("/transactions/{tx_id}/approve"),
        Some(&app.owner_key),
        Some(json!({ "operator": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], json!("completed"));

    let (_, balance) = request(
        &app,
        "GET",
        &format!("/wallets/{wallet_id}/balance"),
        Some(&agent_key),
        None,
    )
    .await;
    assert_eq!(balance["balance"], json!("920.00"));

    // Over the per-transaction cap: 400 with the persisted rejection
    let (status, rejected) = request(
        &app,
        "POST",
        &format!("/wallets/{wallet_id}/transactions"),
        Some(&agent_key),
        Some(json!({ "amount": 250, "category": "advertising" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected["status"], json!("rejected"));

    // Audit trail is owner-readable
    let (status, audit) = request(&app, "GET", "/audit", Some(&app.owner_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(audit.as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn agent_cannot_touch_foreign_wallet() {
    let app = app().await;
    let (_, alpha) = request(
        &app,
        "POST",
        "/agents",
        Some(&app.owner_key),
        Some(json!({ "name": "alpha" })),
    )
    .await;
    let (_, beta) = request(
        &app,
        "POST",
        "/agents",
        Some(&app.owner_key),
        Some(json!({ "name": "beta" })),
    )
    .await;

    let (_, wallet) = request(
        &app,
        "POST",
        "/wallets",
        Some(&app.owner_key),
        Some(json!({ "agent_id": alpha["id"], "currency": "USD" })),
    )
    .await;
    let wallet_id = wallet["id"].as_str().unwrap();

    let beta_key = beta["api_key"].as_str().unwrap();
    let (status, _) = request(
        &app,
        "GET",
        &format!("/wallets/{wallet_id}"),
        Some(beta_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rule_param_validation_is_400() {
    let app = app().await;
    let (_, agent) = request(
        &app,
        "POST",
        "/agents",
        Some(&app.owner_key),
        Some(json!({ "name": "worker" })),
    )
    .await;
    let (_, wallet) = request(
        &app,
        "POST",
        "/wallets",
        Some(&app.owner_key),
        Some(json!({ "agent_id": agent["id"], "currency": "USD" })),
    )
    .await;
    let wallet_id = wallet["id"].as_str().unwrap();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/wallets/{wallet_id}/rules"),
        Some(&app.owner_key),
        Some(json!({ "kind": "time_window", "start_hour": 9, "end_hour": 24 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_RULE_PARAMS"));
}
