//! HTTP API tests
//!
//! Drives the full router over in-memory stores with signed bearer tokens.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use backoffice::{create_app, middleware::Claims, store::MemoryCatalog};
use common::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const ALL_PERMISSIONS: &[&str] = &[
    "inventory:view",
    "inventory:create",
    "inventory:edit",
    "inventory:delete",
];

fn token(permissions: &[&str], secret: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        role_id: Uuid::new_v4().to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn app() -> Router {
    create_app(memory_state(MemoryCatalog::permissive()))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn stock_body(quantity: i64, threshold: i64) -> Value {
    let key = random_key();
    json!({
        "product_id": key.product_id,
        "location_id": key.location_id,
        "variant_id": key.variant_id,
        "quantity": quantity,
        "reorder_threshold": threshold,
    })
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/inventory/stock", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = app();
    let forged = token(ALL_PERMISSIONS, "not-the-secret");
    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/inventory/stock",
        Some(&forged),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let app = app();
    let viewer = token(&["inventory:view"], JWT_SECRET);
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/stock",
        Some(&viewer),
        Some(stock_body(1, 0)),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");

    let (status, _) = call(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Stock and Movements
// ============================================================================

#[tokio::test]
async fn test_stock_and_movement_flow() {
    let app = app();
    let bearer = token(ALL_PERMISSIONS, JWT_SECRET);
    let bearer = Some(bearer.as_str());

    let body = stock_body(10, 5);
    let (status, created) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/stock",
        bearer,
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["quantity_on_hand"], 10);
    assert!(created["error"].is_null());
    let record_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, duplicate) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/stock",
        bearer,
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate["code"], "DUPLICATE_RECORD");

    let (status, outbound) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/movements",
        bearer,
        Some(json!({
            "stock_record_id": record_id,
            "kind": "outbound",
            "quantity": 3,
            "reason": "sold at counter",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outbound["data"]["kind"], "outbound");
    assert_eq!(outbound["data"]["resulting_balance"], 7);
    let entry_id = outbound["data"]["id"].as_str().unwrap().to_string();

    let (status, oversell) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/movements",
        bearer,
        Some(json!({
            "stock_record_id": record_id,
            "kind": "outbound",
            "quantity": 30,
            "reason": "bulk order",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(oversell["success"], false);
    assert_eq!(oversell["code"], "INSUFFICIENT_STOCK");

    let (status, reversal) = call(
        &app,
        Method::POST,
        &format!("/api/v1/inventory/movements/{}/reverse", entry_id),
        bearer,
        Some(json!({ "reason": "sale cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reversal["data"]["kind"], "inbound");
    assert_eq!(reversal["data"]["resulting_balance"], 10);
    assert_eq!(reversal["data"]["reversal_of_entry_id"], entry_id.as_str());

    let (status, detail) = call(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/stock/{}", record_id),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["quantity_on_hand"], 10);
    assert_eq!(detail["data"]["status"], "normal");
    assert_eq!(detail["data"]["recent_entries"].as_array().unwrap().len(), 3);

    let (status, reconcile) = call(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/stock/{}/reconcile", record_id),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reconcile["data"]["consistent"], true);

    let (status, entries) = call(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/stock/{}/entries?page=1&per_page=2", record_id),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries["data"]["pagination"]["total_items"], 3);
    assert_eq!(entries["data"]["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_requests_use_error_envelope() {
    let app = app();
    let bearer = token(ALL_PERMISSIONS, JWT_SECRET);
    let bearer = Some(bearer.as_str());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/movements",
        bearer,
        Some(json!({
            "stock_record_id": Uuid::new_v4(),
            "kind": "teleport",
            "quantity": 1,
            "reason": "testing",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_KIND");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/movements",
        bearer,
        Some(json!({ "kind": "inbound" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/inventory/stock/not-a-uuid",
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/movements/{}", Uuid::new_v4()),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Ledger entry not found");
}

#[tokio::test]
async fn test_void_with_stock_then_alerts() {
    let app = app();
    let bearer = token(ALL_PERMISSIONS, JWT_SECRET);
    let bearer = Some(bearer.as_str());

    let body = stock_body(0, 5);
    let location_id = body["location_id"].as_str().unwrap().to_string();
    let (_, created) = call(
        &app,
        Method::POST,
        "/api/v1/inventory/stock",
        bearer,
        Some(body),
    )
    .await;
    let record_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, alerts) = call(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/alerts?location_id={}", location_id),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alerts["data"]["summary"]["out_of_stock"], 1);
    assert_eq!(alerts["data"]["alerts"][0]["status"], "out_of_stock");

    call(
        &app,
        Method::POST,
        "/api/v1/inventory/movements",
        bearer,
        Some(json!({
            "stock_record_id": record_id,
            "kind": "adjustment",
            "quantity": 2,
            "reason": "found in back room",
        })),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/inventory/stock/{}", record_id),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "HAS_STOCK");

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/inventory/stock/{}", record_id),
        bearer,
        Some(json!({ "reorder_threshold": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reorder_threshold"], 1);

    let (_, alerts) = call(
        &app,
        Method::GET,
        &format!("/api/v1/inventory/alerts?location_id={}", location_id),
        bearer,
        None,
    )
    .await;
    assert_eq!(alerts["data"]["summary"]["total"], 0);
}
