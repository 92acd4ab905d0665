//! Tests for POST /activate and POST /deactivate

use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn setup() -> (axum::Router, AppState) {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        create_test_license(&conn, "ABCDE-12345");
    }
    (public_app(state.clone()), state)
}

fn body(device_id: &str, machine_id: &str) -> serde_json::Value {
    json!({
        "licenseKey": "ABCDE-12345",
        "deviceId": device_id,
        "machineId": machine_id,
    })
}

#[tokio::test]
async fn test_single_device_scenario() {
    let (app, _state) = setup();

    let (status, json) = post_json(&app, "/activate", body("D1", "M1")).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["success"], true, "first activation should succeed: {}", json);
    assert_eq!(json["message"], "License key activated successfully");

    let (status, json) = post_json(&app, "/activate", body("D2", "M2")).await;
    assert_eq!(status, axum::http::StatusCode::OK, "denials are not HTTP errors");
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "This license key is already activated on another device");

    let before = queries::now();
    let (_, json) = post_json(&app, "/deactivate", body("D1", "M1")).await;
    assert_eq!(json["success"], true, "deactivation should succeed: {}", json);
    let cooldown_ends = json["cooldownEnds"].as_str().expect("cooldownEnds should be a string");
    let ends_at = chrono::DateTime::parse_from_rfc3339(cooldown_ends).unwrap().timestamp();
    assert!(
        (ends_at - (before + 2 * ONE_HOUR)).abs() <= 5,
        "cooldown should end about two hours from now"
    );

    let (_, json) = post_json(&app, "/activate", body("D2", "M2")).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["cooldown"], true);
    assert!(json["hoursRemaining"].as_i64().unwrap() > 0);
    assert_eq!(json["cooldownEnds"], cooldown_ends);

    let (_, json) = post_json(&app, "/activate", body("D1", "M1")).await;
    assert_eq!(json["success"], true, "same device bypasses the cooldown: {}", json);
    assert_eq!(json["message"], "License key reactivated successfully");
}

#[tokio::test]
async fn test_repeat_activation_reports_already_active() {
    let (app, state) = setup();

    post_json(&app, "/activate", body("D1", "M1")).await;
    let (_, json) = post_json(&app, "/activate", body("D1", "M1")).await;

    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "License key is already activated on this device");

    let conn = state.db.get().unwrap();
    let license = queries::get_license_by_external_key(&conn, "ABCDE-12345").unwrap().unwrap();
    assert_eq!(queries::list_activations_for_license(&conn, &license.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_legacy_key_fields_and_paths() {
    let (app, _state) = setup();

    let (_, json) = post_json(
        &app,
        "/api/keys/activate",
        json!({"gumroadLicenseKey": "abcde12345", "deviceId": "D1", "machineId": "M1"}),
    )
    .await;
    assert_eq!(json["success"], true, "normalized legacy key should activate: {}", json);

    let (_, json) = post_json(
        &app,
        "/api/keys/deactivate",
        json!({"key": "ABCDE-12345", "deviceId": "D1", "machineId": "M1"}),
    )
    .await;
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_unknown_key_is_a_negative_verdict() {
    let (app, _state) = setup();

    let (status, json) = post_json(
        &app,
        "/activate",
        json!({"licenseKey": "NOPE-00000", "deviceId": "D1", "machineId": "M1"}),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Invalid license key");
}

#[tokio::test]
async fn test_verified_unknown_key_is_synthesized() {
    let (app, state) = setup();

    let (_, json) = post_json(
        &app,
        "/activate",
        json!({"licenseKey": "GUM-NEW", "deviceId": "D1", "machineId": "M1", "gumroadValidated": true}),
    )
    .await;
    assert_eq!(json["success"], true, "verified key should be accepted: {}", json);

    let conn = state.db.get().unwrap();
    assert!(queries::get_license_by_external_key(&conn, "GUM-NEW").unwrap().is_some());
}

#[tokio::test]
async fn test_missing_fields_are_bad_requests() {
    let (app, _state) = setup();

    let (status, json) = post_json(&app, "/activate", json!({"deviceId": "D1", "machineId": "M1"})).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, _) = post_json(&app, "/activate", json!({"licenseKey": "ABCDE-12345", "machineId": "M1"})).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST, "deviceId is required");

    let (status, _) = post_json(&app, "/deactivate", json!({"licenseKey": "ABCDE-12345", "deviceId": "D1"})).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST, "machineId is required");

    let (status, _) = post_json(
        &app,
        "/activate",
        json!({"licenseKey": "--", "deviceId": "D1", "machineId": "M1"}),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST, "key that normalizes to empty");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, _state) = setup();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/activate")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_json_posted_as_text_is_accepted() {
    let (app, _state) = setup();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/activate")
        .header("content-type", "text/plain")
        .body(axum::body::Body::from(body("D1", "M1").to_string()))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["success"], true, "Legacy clients post JSON as text: {}", json);
}

#[tokio::test]
async fn test_deactivate_device_not_activated() {
    let (app, _state) = setup();

    let (status, json) = post_json(&app, "/deactivate", body("D9", "M9")).await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "This device is not activated with this license key");
}

#[tokio::test]
async fn test_disabled_license_stays_disabled_under_verified_variant_key() {
    let (app, state) = setup();
    {
        let conn = state.db.get().unwrap();
        let license = queries::get_license_by_external_key(&conn, "ABCDE-12345").unwrap().unwrap();
        queries::set_license_active(&conn, &license.id, false).unwrap();
    }

    let (_, json) = post_json(
        &app,
        "/activate",
        json!({"licenseKey": "abcde12345", "deviceId": "D1", "machineId": "M1", "verified": true}),
    )
    .await;

    assert_eq!(json["success"], false, "reformatted key must not revive the license: {}", json);
    assert_eq!(json["message"], "This license key has been deactivated");
    let conn = state.db.get().unwrap();
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}
