#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use std::fs;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("deploykit-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_overlay_path_inserts_mode() {
    assert_eq!(
        overlay_path(Path::new("/etc/deploykit.yaml"), DeploymentMode::Production),
        PathBuf::from("/etc/deploykit.prod.yaml")
    );
    assert_eq!(
        overlay_path(Path::new("config"), DeploymentMode::Staging),
        PathBuf::from("config.staging")
    );
}

#[test]
fn test_read_config_base_only() {
    let dir = scratch_dir("base");
    let base = dir.join("deploykit.yaml");
    fs::write(
        &base,
        "port: 50051\nservice_name: orders\ndependencies:\n  db: 10.0.0.5:5432\nservices:\n  orders.v1.Orders: [db]\n",
    )
    .unwrap();

    let config = read_config(&base, DeploymentMode::Development).unwrap();

    assert_eq!(config.port, 50051);
    assert_eq!(config.service_name, "orders");
    assert_eq!(config.probe_timeout_ms, 2000);
    assert!(config
        .services
        .dependencies("orders.v1.Orders")
        .unwrap()
        .contains("db"));
    assert_eq!(config.probe().targets()["db"], "10.0.0.5:5432");
}

#[test]
fn test_read_config_applies_mode_overlay() {
    let dir = scratch_dir("overlay");
    let base = dir.join("deploykit.yaml");
    fs::write(
        &base,
        "port: 50051\nservice_name: orders\ndependencies:\n  db: localhost:5432\n",
    )
    .unwrap();
    fs::write(
        dir.join("deploykit.prod.yaml"),
        "dependencies:\n  db: db.internal:5432\nprobe_timeout_ms: 500\n",
    )
    .unwrap();

    let prod = read_config(&base, DeploymentMode::Production).unwrap();
    assert_eq!(prod.dependencies["db"], "db.internal:5432");
    assert_eq!(prod.probe().timeout(), Duration::from_millis(500));

    let dev = read_config(&base, DeploymentMode::Development).unwrap();
    assert_eq!(dev.dependencies["db"], "localhost:5432");
}

#[test]
fn test_read_config_missing_file() {
    let dir = scratch_dir("missing");

    let result = read_config(&dir.join("absent.yaml"), DeploymentMode::Development);
    assert!(result.is_err());
}

#[test]
fn test_read_config_requires_port() {
    let dir = scratch_dir("noport");
    let base = dir.join("deploykit.yaml");
    fs::write(&base, "service_name: orders\n").unwrap();

    assert!(read_config(&base, DeploymentMode::Development).is_err());
}
