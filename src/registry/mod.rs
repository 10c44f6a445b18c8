//! Entity registry: derivation of the entity set from schemas and snapshots,
//! and reconciliation of that set across polls.
//!
//! Reconciliation is self-healing: entities whose device or backing property
//! disappeared are dropped, and an unavailability issue is raised for each
//! previously-known device missing from the snapshot, clearing once it
//! returns.

use crate::client::Appliance;
use crate::dictionary::{Dictionary, DictionaryStore, EntityKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// One derived entity backed by a device property or composite capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub entity_id: String,
    pub device_id: String,
    pub kind: EntityKind,
    /// Backing raw key; composites span several keys and carry none.
    pub property: Option<String>,
}

/// Identifier of a raised diagnostic issue.
pub fn unavailable_issue_id(device_id: &str) -> String {
    format!("unavailable_device.{device_id}")
}

/// Diagnostic record for a device that vanished from the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnavailableDevice {
    pub device_id: String,
    /// Display name captured from the last snapshot the device appeared in.
    pub device_name: String,
}

impl UnavailableDevice {
    pub fn issue_id(&self) -> String {
        unavailable_issue_id(&self.device_id)
    }
}

fn display_name(appliance: &Appliance) -> String {
    if !appliance.device_nick_name.is_empty() {
        appliance.device_nick_name.clone()
    } else if !appliance.device_feature_name.is_empty() {
        appliance.device_feature_name.clone()
    } else {
        appliance.device_id.clone()
    }
}

/// Derive the entity set for one appliance snapshot.
///
/// Single-key entities exist for declared, non-disabled properties whose
/// current value does not match the unavailability sentinel. Composite
/// capabilities yield one entity per kind regardless of which of their keys
/// are currently reported.
pub fn derive_entities(appliance: &Appliance, dictionary: &Dictionary) -> Vec<EntityRecord> {
    let mut records = Vec::new();

    // Stable iteration keeps reconcile reports deterministic.
    let keys: BTreeSet<_> = appliance.status_list.keys().collect();
    for key in keys {
        let lookup = dictionary.lookup(key);
        if !lookup.is_declared() {
            continue;
        }
        let descriptor = lookup.descriptor();
        if descriptor.disable {
            continue;
        }
        if !descriptor.is_available_for(appliance.status_list.get(key)) {
            continue;
        }
        let kind = descriptor.capability.kind();
        if matches!(
            kind,
            EntityKind::Climate | EntityKind::Humidifier | EntityKind::WaterHeater
        ) {
            continue;
        }
        records.push(EntityRecord {
            entity_id: format!("{}-{}", appliance.device_id, key),
            device_id: appliance.device_id.clone(),
            kind,
            property: Some(key.clone()),
        });
    }

    for (kind, suffix) in [
        (EntityKind::Climate, "climate"),
        (EntityKind::Humidifier, "humidifier"),
        (EntityKind::WaterHeater, "waterheater"),
    ] {
        if dictionary.has_kind(kind) {
            records.push(EntityRecord {
                entity_id: format!("{}-{suffix}", appliance.device_id),
                device_id: appliance.device_id.clone(),
                kind,
                property: None,
            });
        }
    }

    records
}

/// What one reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub issues_raised: Vec<String>,
    pub issues_cleared: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.issues_raised.is_empty()
            && self.issues_cleared.is_empty()
    }
}

/// Registered entity set plus active diagnostic issues.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityRecord>,
    /// Devices seen in any snapshot so far, with their last display name.
    known_devices: BTreeMap<String, String>,
    /// Active diagnostics keyed by device id.
    issues: BTreeMap<String, UnavailableDevice>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    pub fn active_issues(&self) -> impl Iterator<Item = &UnavailableDevice> {
        self.issues.values()
    }

    /// Reconcile the registered set against one snapshot.
    ///
    /// Running the same snapshot twice yields an empty report.
    pub fn reconcile(
        &mut self,
        appliances: &[Appliance],
        dictionaries: &DictionaryStore,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut expected = HashMap::new();
        for appliance in appliances {
            let dictionary = dictionaries.resolve(&appliance.model_key());
            for record in derive_entities(appliance, &dictionary) {
                expected.insert(record.entity_id.clone(), record);
            }
        }

        let stale: Vec<String> = self
            .entities
            .keys()
            .filter(|id| !expected.contains_key(*id))
            .cloned()
            .collect();
        for entity_id in stale {
            self.entities.remove(&entity_id);
            debug!(entity_id = %entity_id, "removing stale entity");
            report.removed.push(entity_id);
        }
        report.removed.sort();

        let mut added = Vec::new();
        for (entity_id, record) in expected {
            match self.entities.insert(entity_id.clone(), record) {
                None => added.push(entity_id),
                Some(previous) => {
                    // Schema updates can re-type an id in place.
                    if previous.kind != self.entities[&entity_id].kind {
                        info!(entity_id = %entity_id, from = ?previous.kind, "entity changed kind");
                    }
                }
            }
        }
        added.sort();
        report.added = added;

        // A device that was seen before but is missing from this snapshot
        // gets a diagnostic issue; it clears the moment the device returns.
        let present: BTreeMap<String, String> = appliances
            .iter()
            .map(|a| (a.device_id.clone(), display_name(a)))
            .collect();
        for device_id in present.keys() {
            if let Some(issue) = self.issues.remove(device_id) {
                info!(device = %device_id, "device is back in the account");
                report.issues_cleared.push(issue.issue_id());
            }
        }
        let missing: Vec<(String, String)> = self
            .known_devices
            .iter()
            .filter(|(id, _)| !present.contains_key(*id))
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();
        for (device_id, device_name) in missing {
            if !self.issues.contains_key(&device_id) {
                info!(device = %device_id, name = %device_name,
                      "device disappeared from the account");
                report.issues_raised.push(unavailable_issue_id(&device_id));
                self.issues.insert(
                    device_id.clone(),
                    UnavailableDevice { device_id, device_name },
                );
            }
        }
        self.known_devices.extend(present);

        report
    }
}
