//! Tests for client and server credential selection

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::material::CredentialErrorKind;
use super::pki::generate_service_bundle;
use super::transport::*;
use crate::deploy::{CredentialStrategy, DeployConfig, DeploymentMode};
use std::collections::HashMap;

const ALL_MODES: [DeploymentMode; 3] = [
    DeploymentMode::Development,
    DeploymentMode::Staging,
    DeploymentMode::Production,
];

fn orders_env() -> HashMap<String, String> {
    generate_service_bundle("orders", &["localhost".to_string()])
        .unwrap()
        .env_vars()
}

fn pinned(mode: DeploymentMode) -> DeployConfig {
    DeployConfig::new(mode, CredentialStrategy::PeerPinned)
}

fn platform(mode: DeploymentMode) -> DeployConfig {
    DeployConfig::new(mode, CredentialStrategy::PlatformIdentity)
}

#[test]
fn test_client_credentials_encrypted_only_in_release() {
    let env = orders_env();

    for mode in ALL_MODES {
        for config in [pinned(mode), platform(mode)] {
            let creds =
                client_credentials(&config, &env, "orders.internal:443", Some("orders")).unwrap();
            assert_eq!(
                creds.is_encrypted(),
                mode.is_release(),
                "mode {} strategy {:?}",
                mode,
                config.strategy()
            );
            assert_eq!(creds.tls_config().is_some(), mode.is_release());
        }
    }
}

#[test]
fn test_development_ignores_missing_material() {
    let env: HashMap<String, String> = HashMap::new();

    let client = client_credentials(&pinned(DeploymentMode::Development), &env, "h:1", None);
    let server = server_credentials(&pinned(DeploymentMode::Development), &env, "orders");

    assert!(matches!(client.unwrap(), ClientCredentials::Insecure));
    assert!(matches!(server.unwrap(), ServerCredentials::Insecure));
}

#[test]
fn test_peer_pinned_client_loads_triple() {
    let env = orders_env();

    let creds = client_credentials(
        &pinned(DeploymentMode::Production),
        &env,
        "orders.internal:443",
        Some("orders"),
    )
    .unwrap();

    match &creds {
        ClientCredentials::PeerPinned { ca, domain, .. } => {
            assert_eq!(ca.len(), 1);
            assert_eq!(domain, "orders.internal");
        }
        other => panic!("expected peer-pinned credentials, got {:?}", other),
    }
    assert!(!creds.uses_identity_token());
}

#[test]
fn test_peer_pinned_client_fails_closed() {
    for missing in ["ORDERS_CERT", "ORDERS_KEY", "ORDERS_CA"] {
        let mut env = orders_env();
        env.remove(missing);

        let result = client_credentials(
            &pinned(DeploymentMode::Staging),
            &env,
            "orders:443",
            Some("orders"),
        );
        assert!(result.is_err(), "removing {} should fail", missing);
    }
}

#[test]
fn test_peer_pinned_client_requires_service_name() {
    let err = client_credentials(
        &pinned(DeploymentMode::Production),
        &orders_env(),
        "orders:443",
        None,
    )
    .unwrap_err();

    assert_eq!(err.kind(), CredentialErrorKind::MissingService);
}

#[test]
fn test_platform_identity_client_needs_no_material() {
    let creds = client_credentials(
        &platform(DeploymentMode::Production),
        &HashMap::<String, String>::new(),
        "https://orders-abc.a.run.app",
        None,
    )
    .unwrap();

    assert!(creds.uses_identity_token());
    assert_eq!(creds.domain(), Some("orders-abc.a.run.app"));
}

/// Scenario: production requires client certs, development does not
#[test]
fn test_server_credentials_production_then_development() {
    let env = orders_env();

    let prod = server_credentials(&pinned(DeploymentMode::Production), &env, "orders").unwrap();
    assert!(prod.is_encrypted());
    assert!(prod.requires_client_cert());
    assert!(prod.tls_config().is_some());

    let dev = server_credentials(&pinned(DeploymentMode::Development), &env, "orders").unwrap();
    assert!(matches!(dev, ServerCredentials::Insecure));
    assert!(!dev.requires_client_cert());
    assert!(dev.tls_config().is_none());
}

#[test]
fn test_server_credentials_fail_closed_per_variable() {
    for (missing, kind) in [
        ("ORDERS_CERT", CredentialErrorKind::MissingCert),
        ("ORDERS_KEY", CredentialErrorKind::MissingKey),
        ("ORDERS_CA", CredentialErrorKind::MissingCa),
    ] {
        let mut env = orders_env();
        env.remove(missing);

        let err =
            server_credentials(&pinned(DeploymentMode::Production), &env, "orders").unwrap_err();
        assert_eq!(err.kind(), kind, "removing {}", missing);
    }
}

#[test]
fn test_platform_identity_server_has_no_client_cert_requirement() {
    let creds = server_credentials(
        &platform(DeploymentMode::Production),
        &HashMap::<String, String>::new(),
        "orders",
    )
    .unwrap();

    assert!(matches!(creds, ServerCredentials::PlatformTerminated));
    assert!(!creds.requires_client_cert());
}

#[test]
fn test_tls_domain_strips_scheme_port_and_path() {
    assert_eq!(tls_domain("orders:50051"), "orders");
    assert_eq!(tls_domain("https://orders.example.com:443/x"), "orders.example.com");
    assert_eq!(tls_domain("orders.example.com"), "orders.example.com");
    assert_eq!(tls_domain("[::1]:8443"), "::1");
}

#[test]
fn test_tls_domain_keeps_bare_ipv6_host() {
    assert_eq!(tls_domain("::1"), "::1");
    assert_eq!(tls_domain("fe80::1"), "fe80::1");
    assert_eq!(tls_domain("https://::1"), "::1");
}
