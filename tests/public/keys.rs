//! Tests for POST /keys/generate

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_generate_returns_stable_key_per_purchase() {
    let state = create_test_app_state();
    let app = public_app(state.clone());
    let request = json!({"email": "a@example.com", "licenseKey": "GUM-1", "purchaseId": "sale-1"});

    let (status, first) = post_json(&app, "/keys/generate", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let key = first["key"].as_str().expect("key should be a string").to_string();
    assert_eq!(key.len(), 29, "five groups of five plus four hyphens");

    let (_, second) = post_json(&app, "/keys/generate", request).await;
    assert_eq!(second["key"], key.as_str(), "same purchase yields the same key");

    let conn = state.db.get().unwrap();
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}

#[tokio::test]
async fn test_generate_accepts_legacy_field_names() {
    let app = public_app(create_test_app_state());

    let (status, json) = post_json(
        &app,
        "/api/keys/generate",
        json!({"email": "a@example.com", "gumroadLicenseKey": "GUM-2", "gumroadPurchaseId": "sale-2"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected response {}", json);
    assert!(json["key"].is_string());
}

#[tokio::test]
async fn test_generated_key_activates() {
    let app = public_app(create_test_app_state());

    let (_, json) = post_json(
        &app,
        "/keys/generate",
        json!({"email": "a@example.com", "licenseKey": "GUM-3", "purchaseId": "sale-3"}),
    )
    .await;
    let key = json["key"].as_str().unwrap().to_lowercase();

    let (_, json) = post_json(
        &app,
        "/activate",
        json!({"key": key, "deviceId": "D1", "machineId": "M1"}),
    )
    .await;
    assert_eq!(json["success"], true, "local key should resolve: {}", json);
}

#[tokio::test]
async fn test_generate_requires_all_fields() {
    let app = public_app(create_test_app_state());

    let (status, json) = post_json(
        &app,
        "/keys/generate",
        json!({"email": "a@example.com", "licenseKey": "GUM-4"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"], "Missing purchaseId");
}

#[tokio::test]
async fn test_generate_for_key_of_other_purchase_is_bad_request() {
    let state = create_test_app_state();
    {
        let mut conn = state.db.get().unwrap();
        let purchase = licensing::PurchaseNotification {
            purchase_id: "P1".to_string(),
            email: "buyer@example.com".to_string(),
            license_key: "GUM-KEY".to_string(),
            product_id: None,
        };
        licensing::record_purchase(&mut conn, &purchase).unwrap();
    }
    let app = public_app(state);

    let (status, json) = post_json(
        &app,
        "/keys/generate",
        json!({"email": "other@example.com", "licenseKey": "GUM-KEY", "purchaseId": "P2"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected response {}", json);
    assert_eq!(json["details"], "License key is already registered to another purchase");
}

#[tokio::test]
async fn test_generate_for_synthesized_key_attaches_purchase() {
    let state = create_test_app_state();
    let app = public_app(state.clone());

    let (_, json) = post_json(
        &app,
        "/validate",
        json!({"licenseKey": "SYN-KEY", "deviceId": "D1", "machineId": "M1", "verified": true}),
    )
    .await;
    assert_eq!(json["valid"], true, "verified key should be synthesized: {}", json);

    let (status, json) = post_json(
        &app,
        "/keys/generate",
        json!({"email": "a@example.com", "licenseKey": "SYN-KEY", "purchaseId": "P3"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected response {}", json);

    let conn = state.db.get().unwrap();
    let license = queries::get_license_by_purchase_id(&conn, "P3").unwrap().unwrap();
    assert_eq!(license.external_key, "SYN-KEY");
    assert_eq!(license.local_key.as_deref(), json["key"].as_str());
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}
