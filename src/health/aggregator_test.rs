//! Tests for health aggregation

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::server::shutdown_channel;
use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn orders_map() -> ServiceHealthMap {
    ServiceHealthMap::new()
        .service("svcA", ["db"])
        .service("svcB", ["cache"])
}

fn db_down() -> DependencyStatus {
    DependencyStatus::new()
        .failed("db", anyhow!("connection refused"))
        .healthy("cache")
}

#[test]
fn test_failed_dependency_marks_only_its_services() {
    let report = evaluate(&orders_map(), &db_down());

    assert_eq!(report.services["svcA"], ServingStatus::NotServing);
    assert_eq!(report.services["svcB"], ServingStatus::Serving);
    assert_eq!(report.global, ServingStatus::NotServing);
}

#[test]
fn test_all_healthy_is_serving() {
    let status = DependencyStatus::new().healthy("db").healthy("cache");

    let report = evaluate(&orders_map(), &status);

    assert_eq!(report.global, ServingStatus::Serving);
    assert!(report
        .services
        .values()
        .all(|s| *s == ServingStatus::Serving));
}

#[test]
fn test_empty_probe_and_map_is_serving_with_no_services() {
    let report = evaluate(&ServiceHealthMap::new(), &DependencyStatus::new());

    assert_eq!(report.global, ServingStatus::Serving);
    assert!(report.services.is_empty());
    assert_eq!(report.entries().count(), 1);
}

#[test]
fn test_absent_dependency_counts_as_healthy() {
    let map = ServiceHealthMap::new().service("svcC", ["queue"]);

    let report = evaluate(&map, &DependencyStatus::new().healthy("db"));

    assert_eq!(report.services["svcC"], ServingStatus::Serving);
}

#[test]
fn test_undeclared_failure_still_fails_global() {
    let map = ServiceHealthMap::new().service("svcB", ["cache"]);
    let status = DependencyStatus::new()
        .healthy("cache")
        .failed("metrics-sink", anyhow!("timeout"));

    let report = evaluate(&map, &status);

    assert_eq!(report.services["svcB"], ServingStatus::Serving);
    assert_eq!(report.global, ServingStatus::NotServing);
}

#[test]
fn test_service_with_several_dependencies() {
    let map = ServiceHealthMap::new().service("checkout", ["db", "cache", "payments"]);
    let status = DependencyStatus::new()
        .healthy("db")
        .healthy("cache")
        .failed("payments", anyhow!("503"));

    let report = evaluate(&map, &status);
    assert_eq!(report.services["checkout"], ServingStatus::NotServing);
}

#[test]
fn test_report_entries_start_with_root() {
    let report = evaluate(&orders_map(), &db_down());
    let entries: Vec<_> = report.entries().collect();

    assert_eq!(entries[0], (ROOT_SERVICE, ServingStatus::NotServing));
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn test_cycle_publishes_to_registry() {
    let registry = HealthRegistry::new();
    let aggregator =
        HealthAggregator::new(registry.clone(), orders_map(), Arc::new(|| async { db_down() }));

    aggregator.run_cycle().await;

    assert_eq!(registry.status(""), ServingStatus::NotServing);
    assert_eq!(registry.status("svcA"), ServingStatus::NotServing);
    assert_eq!(registry.status("svcB"), ServingStatus::Serving);
    assert_eq!(registry.status("svcZ"), ServingStatus::Unknown);
}

#[tokio::test]
async fn test_cycle_is_idempotent_for_unchanged_probe() {
    let registry = HealthRegistry::new();
    let aggregator =
        HealthAggregator::new(registry.clone(), orders_map(), Arc::new(|| async { db_down() }));

    let first = aggregator.run_cycle().await;
    let after_first = registry.snapshot();
    let second = aggregator.run_cycle().await;

    assert_eq!(first, second);
    assert_eq!(after_first, registry.snapshot());
}

#[tokio::test]
async fn test_each_cycle_replaces_previous_judgement() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let probe = move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                db_down()
            } else {
                DependencyStatus::new().healthy("db").healthy("cache")
            }
        }
    };

    let registry = HealthRegistry::new();
    let aggregator = HealthAggregator::new(registry.clone(), orders_map(), Arc::new(probe));

    aggregator.run_cycle().await;
    assert_eq!(registry.status("svcA"), ServingStatus::NotServing);

    aggregator.run_cycle().await;
    assert_eq!(registry.status("svcA"), ServingStatus::Serving);
    assert_eq!(registry.status(""), ServingStatus::Serving);
}

#[tokio::test]
async fn test_empty_map_writes_only_root() {
    let registry = HealthRegistry::new();
    let aggregator = HealthAggregator::new(
        registry.clone(),
        ServiceHealthMap::new(),
        Arc::new(|| async { DependencyStatus::new() }),
    );

    aggregator.run_cycle().await;

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[""], ServingStatus::Serving);
}

#[tokio::test(start_paused = true)]
async fn test_run_refreshes_on_interval_until_shutdown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let probe = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { DependencyStatus::new() }
    };

    let aggregator =
        HealthAggregator::new(HealthRegistry::new(), ServiceHealthMap::new(), Arc::new(probe));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(aggregator.run(signal));

    // First cycle runs immediately, then one per interval
    tokio::time::sleep(REFRESH_INTERVAL * 2 + Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("aggregator should stop after shutdown")
        .unwrap();

    tokio::time::sleep(REFRESH_INTERVAL * 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_exits_immediately_when_already_shut_down() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let probe = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { DependencyStatus::new() }
    };

    let aggregator =
        HealthAggregator::new(HealthRegistry::new(), ServiceHealthMap::new(), Arc::new(probe))
            .with_interval(Duration::from_secs(1));
    let (controller, signal) = shutdown_channel();
    controller.shutdown();

    aggregator.run(signal).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_service_health_map_from_yaml() {
    let map: ServiceHealthMap = serde_yaml::from_str("svcA: [db]\nsvcB: [cache, db]\n").unwrap();

    assert_eq!(map.len(), 2);
    assert!(map.dependencies("svcB").unwrap().contains("cache"));
}
