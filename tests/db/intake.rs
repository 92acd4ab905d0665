//! Purchase intake and local key issuance tests

#[path = "../common/mod.rs"]
mod common;
use common::*;

use keyhold::licensing::{
    IntakeOutcome, PurchaseNotification, generate_local_key, issue_local_key, record_purchase,
};

fn purchase(purchase_id: &str, license_key: &str) -> PurchaseNotification {
    PurchaseNotification {
        purchase_id: purchase_id.to_string(),
        email: "buyer@example.com".to_string(),
        license_key: license_key.to_string(),
        product_id: Some("prod_1".to_string()),
    }
}

#[test]
fn test_record_purchase_creates_license() {
    let mut conn = setup_test_db();

    let outcome = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();
    let IntakeOutcome::Created(license) = outcome else {
        panic!("first notification should create a license");
    };

    assert_eq!(license.external_key, "GUM-KEY-1");
    assert_eq!(license.purchase_id.as_deref(), Some("sale-1"));
    assert_eq!(license.email.as_deref(), Some("buyer@example.com"));
    assert!(license.active);
}

#[test]
fn test_record_purchase_is_idempotent() {
    let mut conn = setup_test_db();

    record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();
    let outcome = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();

    assert!(matches!(outcome, IntakeOutcome::Unchanged(_)));
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}

#[test]
fn test_changed_key_updates_existing_license_once() {
    let mut conn = setup_test_db();

    let first = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();
    let updated = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-2")).unwrap();
    let repeated = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-2")).unwrap();

    assert!(matches!(updated, IntakeOutcome::KeyUpdated(_)));
    assert!(matches!(repeated, IntakeOutcome::Unchanged(_)));
    assert_eq!(updated.license().id, first.license().id, "same license row is reused");
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1, "no duplicate license");

    let stored = queries::get_license_by_purchase_id(&conn, "sale-1").unwrap().unwrap();
    assert_eq!(stored.external_key, "GUM-KEY-2");
}

#[test]
fn test_purchase_attaches_to_synthesized_license() {
    let mut conn = setup_test_db();
    let synthesized = licensing::resolve_or_synthesize(&conn, "GUM-KEY-1", true, &ActivationPolicy::default())
        .unwrap()
        .unwrap();

    let outcome = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();

    assert_eq!(outcome.license().id, synthesized.id);
    assert_eq!(outcome.license().purchase_id.as_deref(), Some("sale-1"));
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}

#[test]
fn test_key_owned_by_other_purchase_is_rejected() {
    let mut conn = setup_test_db();
    record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();

    let result = record_purchase(&mut conn, &purchase("sale-2", "GUM-KEY-1"));
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}

#[test]
fn test_key_change_onto_synthesized_license_is_rejected() {
    let mut conn = setup_test_db();
    record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();
    licensing::resolve_or_synthesize(&conn, "GUM-KEY-2", true, &ActivationPolicy::default())
        .unwrap()
        .unwrap();

    let result = record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-2"));

    assert!(
        matches!(result, Err(AppError::BadRequest(_))),
        "Key held by a synthesized license must not move onto another purchase"
    );
    let stored = queries::get_license_by_purchase_id(&conn, "sale-1").unwrap().unwrap();
    assert_eq!(stored.external_key, "GUM-KEY-1");
}

#[test]
fn test_generated_key_format() {
    for _ in 0..50 {
        let key = generate_local_key();
        let groups: Vec<&str> = key.split('-').collect();

        assert_eq!(groups.len(), 5, "key {} should have five groups", key);
        for group in groups {
            assert_eq!(group.len(), 5);
            assert!(
                group.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)),
                "group {} should be uppercase hex",
                group
            );
        }
    }
}

#[test]
fn test_issue_local_key_is_stable_per_purchase() {
    let mut conn = setup_test_db();

    let first = issue_local_key(&mut conn, "a@example.com", "GUM-KEY-1", "sale-1").unwrap();
    let second = issue_local_key(&mut conn, "a@example.com", "GUM-KEY-1", "sale-1").unwrap();

    assert_eq!(first, second, "repeat calls return the same key");
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);

    let (license, _) = licensing::resolve_license(&conn, &first).unwrap().unwrap();
    assert_eq!(license.external_key, "GUM-KEY-1");
}

#[test]
fn test_issue_local_key_for_webhook_license() {
    let mut conn = setup_test_db();
    record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();

    let key = issue_local_key(&mut conn, "buyer@example.com", "GUM-KEY-1", "sale-1").unwrap();

    let stored = queries::get_license_by_purchase_id(&conn, "sale-1").unwrap().unwrap();
    assert_eq!(stored.local_key.as_deref(), Some(key.as_str()));
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
}

#[test]
fn test_issue_local_key_rejects_key_of_other_purchase() {
    let mut conn = setup_test_db();
    record_purchase(&mut conn, &purchase("sale-1", "GUM-KEY-1")).unwrap();

    let result = issue_local_key(&mut conn, "b@example.com", "GUM-KEY-1", "sale-2");

    assert!(matches!(result, Err(AppError::BadRequest(_))), "got {:?}", result);
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);
    assert!(queries::get_license_by_purchase_id(&conn, "sale-2").unwrap().is_none());
}

#[test]
fn test_issue_local_key_claims_synthesized_license() {
    let mut conn = setup_test_db();
    let synthesized = licensing::resolve_or_synthesize(&conn, "SYN-KEY", true, &ActivationPolicy::default())
        .unwrap()
        .unwrap();

    let key = issue_local_key(&mut conn, "a@example.com", "SYN-KEY", "sale-3").unwrap();

    let license = queries::get_license_by_purchase_id(&conn, "sale-3")
        .unwrap()
        .expect("purchase should be attached");
    assert_eq!(license.id, synthesized.id);
    assert_eq!(license.local_key.as_deref(), Some(key.as_str()));
    assert_eq!(license.email.as_deref(), Some("a@example.com"));
    assert_eq!(queries::count_licenses(&conn).unwrap(), 1);

    let again = issue_local_key(&mut conn, "a@example.com", "SYN-KEY", "sale-3").unwrap();
    assert_eq!(again, key);
}
