//! Tests for the in-process health registry (§9, §13).
//!
//! There's no HTTP surface in this repo's scope, so these tests exercise
//! `telemetry::health()` directly rather than through an endpoint.

use telemetry::{health, HealthStatus};

#[test]
fn report_is_unhealthy_when_no_component_has_reported() {
    let registry = telemetry::HealthRegistry::new();
    let report = registry.report();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.components.len(), 3);
}

#[test]
fn report_is_degraded_when_some_components_are_healthy() {
    let registry = telemetry::HealthRegistry::new();
    registry.cursor_store.set_healthy();
    let report = registry.report();
    assert_eq!(report.status, HealthStatus::Degraded);
}

#[test]
fn report_is_healthy_when_all_components_report_healthy() {
    let registry = telemetry::HealthRegistry::new();
    registry.cursor_store.set_healthy();
    registry.broker.set_healthy();
    registry.recorder_db.set_healthy();
    let report = registry.report();
    assert_eq!(report.status, HealthStatus::Healthy);
}

#[test]
fn readiness_tracks_broker_health_only() {
    let registry = telemetry::HealthRegistry::new();
    assert!(!registry.is_ready());
    registry.broker.set_healthy();
    assert!(registry.is_ready());
}

#[test]
fn global_registry_is_reachable() {
    // Smoke test for the process-wide singleton used by the binaries.
    let _ = health().report();
}
