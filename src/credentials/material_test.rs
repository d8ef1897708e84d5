//! Tests for loading credential material from the environment

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::material::*;
use super::pki::generate_service_bundle;
use std::collections::HashMap;

fn orders_env() -> HashMap<String, String> {
    generate_service_bundle("orders", &["localhost".to_string()])
        .unwrap()
        .env_vars()
}

#[test]
fn test_variable_names_are_uppercased() {
    assert_eq!(cert_var("orders"), "ORDERS_CERT");
    assert_eq!(key_var("orders"), "ORDERS_KEY");
    assert_eq!(ca_var("orders"), "ORDERS_CA");
}

#[test]
fn test_dashes_and_dots_become_underscores() {
    assert_eq!(env_prefix("orders-api.v2"), "ORDERS_API_V2");
}

#[test]
fn test_load_certificate_succeeds() {
    let env = orders_env();

    let material = load_certificate(&env, "orders").unwrap();

    assert!(material.subject().contains("orders"));
    assert!(material.not_after() > chrono::Utc::now().timestamp());
    assert!(material.cert_pem().contains("-----BEGIN CERTIFICATE-----"));
}

#[test]
fn test_load_ca_succeeds() {
    let env = orders_env();

    let ca = load_ca(&env, "orders").unwrap();

    assert_eq!(ca.len(), 1);
    assert!(!ca.is_empty());
}

#[test]
fn test_missing_cert_is_distinct() {
    let mut env = orders_env();
    env.remove("ORDERS_CERT");

    let err = load_certificate(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::MissingCert);
}

#[test]
fn test_missing_key_is_distinct() {
    let mut env = orders_env();
    env.remove("ORDERS_KEY");

    let err = load_certificate(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::MissingKey);
}

#[test]
fn test_missing_ca_is_distinct() {
    let mut env = orders_env();
    env.remove("ORDERS_CA");

    // Cert and key alone still load
    assert!(load_certificate(&env, "orders").is_ok());

    let err = load_ca(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::MissingCa);
}

#[test]
fn test_blank_variable_counts_as_missing() {
    let mut env = orders_env();
    env.insert("ORDERS_CERT".to_string(), "  \n".to_string());

    let err = load_certificate(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::MissingCert);
}

#[test]
fn test_garbage_certificate_is_parse_failure() {
    let mut env = orders_env();
    env.insert("ORDERS_CERT".to_string(), "not a certificate".to_string());

    let err = load_certificate(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::Parse);
    assert!(err.to_string().contains("ORDERS_CERT"));
}

#[test]
fn test_corrupt_certificate_body_is_parse_failure() {
    let mut env = orders_env();
    let corrupt = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
    env.insert("ORDERS_CERT".to_string(), corrupt.to_string());

    let err = load_certificate(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::Parse);
}

#[test]
fn test_garbage_key_is_parse_failure() {
    let mut env = orders_env();
    env.insert("ORDERS_KEY".to_string(), "not a key".to_string());

    let err = load_certificate(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::Parse);
    assert!(err.to_string().contains("ORDERS_KEY"));
}

#[test]
fn test_garbage_ca_is_parse_failure() {
    let mut env = orders_env();
    env.insert("ORDERS_CA".to_string(), "not a bundle".to_string());

    let err = load_ca(&env, "orders").unwrap_err();
    assert_eq!(err.kind(), CredentialErrorKind::Parse);
}

#[test]
fn test_ca_bundle_with_multiple_certificates() {
    let first = generate_service_bundle("orders", &["localhost".to_string()]).unwrap();
    let second = generate_service_bundle("billing", &["localhost".to_string()]).unwrap();

    let env = HashMap::from([(
        "ORDERS_CA".to_string(),
        format!("{}{}", first.ca_cert_pem, second.ca_cert_pem),
    )]);

    let ca = load_ca(&env, "orders").unwrap();
    assert_eq!(ca.len(), 2);
}

#[test]
fn test_material_debug_does_not_leak_key() {
    let env = orders_env();
    let material = load_certificate(&env, "orders").unwrap();

    let debug = format!("{:?}", material);
    assert!(!debug.contains("PRIVATE KEY"));
}
