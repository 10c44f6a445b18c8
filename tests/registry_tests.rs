//! Registry reconciliation across poll snapshots.

mod common;

use common::{appliance, offline, write_schema, AC_SCHEMA};
use connectlife_bridge::dictionary::DictionaryStore;
use connectlife_bridge::registry::{unavailable_issue_id, EntityRegistry};
use tempfile::TempDir;

fn store() -> (DictionaryStore, TempDir) {
    let dir = TempDir::new().unwrap();
    write_schema(dir.path(), "009-109", AC_SCHEMA);
    let store = DictionaryStore::new(dir.path());
    (store, dir)
}

fn ac(device_id: &str) -> connectlife_bridge::Appliance {
    appliance(
        device_id,
        ("009", "109"),
        &[("t_power", 1), ("f_temp_in", 21), ("t_beep", 0)],
    )
}

#[test]
fn first_reconcile_registers_everything() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();

    let report = registry.reconcile(&[ac("d1")], &store);
    assert_eq!(
        report.added,
        vec!["d1-climate", "d1-f_temp_in", "d1-t_beep"]
    );
    assert!(report.removed.is_empty());
    assert!(registry.contains("d1-climate"));
}

#[test]
fn reconcile_is_idempotent() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();
    let snapshot = vec![ac("d1")];

    registry.reconcile(&snapshot, &store);
    let report = registry.reconcile(&snapshot, &store);
    assert!(report.is_empty());
}

#[test]
fn vanished_devices_lose_their_entities_and_raise_an_issue() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();

    registry.reconcile(&[ac("d1"), ac("d2")], &store);
    let report = registry.reconcile(&[ac("d1")], &store);

    assert_eq!(
        report.removed,
        vec!["d2-climate", "d2-f_temp_in", "d2-t_beep"]
    );
    assert_eq!(report.issues_raised, vec![unavailable_issue_id("d2")]);
    assert!(registry.contains("d1-climate"));
    assert!(!registry.contains("d2-climate"));

    // The issue record carries the nickname from the last good snapshot.
    let issue = registry.active_issues().next().unwrap();
    assert_eq!(issue.device_id, "d2");
    assert_eq!(issue.device_name, "d2 nickname");
    assert_eq!(issue.issue_id(), unavailable_issue_id("d2"));

    // Still missing: the issue persists without duplicating.
    let report = registry.reconcile(&[ac("d1")], &store);
    assert!(report.is_empty());
    assert_eq!(registry.active_issues().count(), 1);
}

#[test]
fn dropped_properties_remove_only_their_entity() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();

    registry.reconcile(&[ac("d1")], &store);
    let trimmed = appliance("d1", ("009", "109"), &[("t_power", 1), ("t_beep", 0)]);
    let report = registry.reconcile(&[trimmed], &store);

    assert_eq!(report.removed, vec!["d1-f_temp_in"]);
    assert!(registry.contains("d1-t_beep"));
    assert!(registry.contains("d1-climate"));
}

#[test]
fn returning_devices_clear_their_issue() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();

    registry.reconcile(&[ac("d1")], &store);
    registry.reconcile(&[], &store);
    let report = registry.reconcile(&[ac("d1")], &store);

    assert_eq!(report.issues_cleared, vec![unavailable_issue_id("d1")]);
    assert_eq!(registry.active_issues().count(), 0);
    assert!(registry.contains("d1-climate"));
}

#[test]
fn offline_devices_keep_their_entities() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();

    // Offline is an availability concern, not a registration one.
    let report = registry.reconcile(&[offline(ac("d1"))], &store);
    assert!(report.issues_raised.is_empty());
    assert!(registry.contains("d1-climate"));
}

#[test]
fn unknown_model_keys_derive_no_entities() {
    let (store, _dir) = store();
    let mut registry = EntityRegistry::new();

    let mystery = appliance("dx", ("999", "999"), &[("f_something", 1)]);
    let report = registry.reconcile(&[mystery], &store);
    assert!(report.added.is_empty());
}
