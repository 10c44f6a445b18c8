//! Humidifier/dehumidifier entity: schema binding and state projection.

use super::{reverse_table, HumidifierAction, Projected};
use crate::client::Appliance;
use crate::dictionary::{Capability, Dictionary, HumidifierTarget};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct HumidifierState {
    pub available: bool,
    pub is_on: bool,
    pub mode: Projected<String>,
    pub action: Projected<HumidifierAction>,
    pub target_humidity: Option<f64>,
}

impl Default for HumidifierState {
    fn default() -> Self {
        Self {
            available: true,
            is_on: true,
            mode: Projected::Unset,
            action: Projected::Unset,
            target_humidity: None,
        }
    }
}

#[derive(Debug)]
pub struct HumidifierEntity {
    target_keys: HashMap<HumidifierTarget, String>,
    mode_table: HashMap<i64, String>,
    mode_reverse: HashMap<String, i64>,
    action_table: HashMap<i64, HumidifierAction>,
    /// `humidifier` or `dehumidifier`.
    device_class: Option<String>,
    min_humidity: Option<f64>,
    max_humidity: Option<f64>,
}

impl HumidifierEntity {
    pub fn from_dictionary(model_key: &str, dictionary: &Dictionary) -> Option<Self> {
        let mut entity = HumidifierEntity {
            target_keys: HashMap::new(),
            mode_table: HashMap::new(),
            mode_reverse: HashMap::new(),
            action_table: HashMap::new(),
            device_class: None,
            min_humidity: None,
            max_humidity: None,
        };

        let mut bound_any = false;
        for descriptor in dictionary.properties() {
            let Capability::Humidifier(spec) = &descriptor.capability else {
                continue;
            };
            bound_any = true;
            if entity.device_class.is_none() {
                entity.device_class = spec.device_class.clone();
            }
            let Some(target) = spec.target else { continue };

            if let Some(previous) = entity
                .target_keys
                .insert(target, descriptor.name.clone())
            {
                warn!(model_key, ?target, previous = %previous, kept = %descriptor.name,
                      "duplicate humidifier target");
            }

            match target {
                HumidifierTarget::Mode => {
                    let context = format!("{model_key}:{}", descriptor.name);
                    entity.mode_table =
                        spec.options.iter().map(|(c, l)| (*c, l.clone())).collect();
                    entity.mode_reverse = reverse_table(&context, &spec.options);
                }
                HumidifierTarget::Action => {
                    for (code, label) in &spec.options {
                        match HumidifierAction::from_label(label) {
                            Some(action) => {
                                entity.action_table.insert(*code, action);
                            }
                            None => {
                                warn!(model_key, property = %descriptor.name, label = %label,
                                      "unrecognized humidifier action label");
                            }
                        }
                    }
                }
                HumidifierTarget::TargetHumidity => {
                    entity.min_humidity = spec.min_value;
                    entity.max_humidity = spec.max_value;
                }
                HumidifierTarget::IsOn => {}
            }
        }

        bound_any.then_some(entity)
    }

    pub fn key(&self, target: HumidifierTarget) -> Option<&str> {
        self.target_keys.get(&target).map(String::as_str)
    }

    pub fn modes(&self) -> Vec<&str> {
        self.mode_table.values().map(String::as_str).collect()
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    pub fn min_humidity(&self) -> Option<f64> {
        self.min_humidity
    }

    pub fn max_humidity(&self) -> Option<f64> {
        self.max_humidity
    }

    pub(crate) fn mode_code(&self, label: &str) -> Option<i64> {
        self.mode_reverse.get(label).copied()
    }

    pub fn project(
        &self,
        appliance: &Appliance,
        previous: Option<&HumidifierState>,
    ) -> HumidifierState {
        let mut state = previous.cloned().unwrap_or_default();
        let status = &appliance.status_list;

        state.is_on = true;
        if let Some(key) = self.target_keys.get(&HumidifierTarget::IsOn) {
            if let Some(code) = status.get(key).and_then(|v| v.as_code()) {
                state.is_on = code != 0;
            }
        }

        if let Some(key) = self.target_keys.get(&HumidifierTarget::Mode) {
            if let Some(code) = status.get(key).and_then(|v| v.as_code()) {
                state.mode = match self.mode_table.get(&code) {
                    Some(label) => Projected::Value(label.clone()),
                    None => {
                        warn!(device = %appliance.device_id, property = %key, code,
                              "raw humidifier mode has no option entry");
                        Projected::Unmapped
                    }
                };
            }
        }

        if let Some(key) = self.target_keys.get(&HumidifierTarget::Action) {
            if let Some(code) = status.get(key).and_then(|v| v.as_code()) {
                state.action = match self.action_table.get(&code) {
                    Some(action) => Projected::Value(*action),
                    None => Projected::Unmapped,
                };
            }
        }

        if let Some(key) = self.target_keys.get(&HumidifierTarget::TargetHumidity) {
            if let Some(value) = status.get(key) {
                state.target_humidity = value.as_number();
            }
        }

        state.available = appliance.is_online();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StatusValue;
    use crate::dictionary::parse_dictionary;

    const SCHEMA: &str = r#"{
        "properties": [
            { "property": "t_power", "humidifier": { "target": "is_on" } },
            { "property": "t_mode",
              "humidifier": { "target": "mode",
                              "options": { "1": "auto", "2": "continuous" },
                              "device_class": "dehumidifier" } },
            { "property": "f_state",
              "humidifier": { "target": "action",
                              "options": { "0": "idle", "1": "drying" } } },
            { "property": "t_humidity",
              "humidifier": { "target": "target_humidity",
                              "min_value": 30.0, "max_value": 80.0 } }
        ]
    }"#;

    fn appliance(status: &[(&str, i64)]) -> Appliance {
        Appliance {
            device_id: "h1".into(),
            puid: "ph1".into(),
            device_type_code: "007".into(),
            device_feature_code: "400".into(),
            device_feature_name: String::new(),
            device_nick_name: String::new(),
            room_name: String::new(),
            offline_state: 1,
            status_list: status
                .iter()
                .map(|(k, v)| (k.to_string(), StatusValue::Int(*v)))
                .collect(),
        }
    }

    fn entity() -> HumidifierEntity {
        let dictionary = parse_dictionary("007-400", SCHEMA).unwrap();
        HumidifierEntity::from_dictionary("007-400", &dictionary).unwrap()
    }

    #[test]
    fn projects_power_mode_and_action() {
        let entity = entity();
        let state = entity.project(
            &appliance(&[("t_power", 1), ("t_mode", 2), ("f_state", 1), ("t_humidity", 55)]),
            None,
        );
        assert!(state.is_on);
        assert_eq!(state.mode, Projected::Value("continuous".to_string()));
        assert_eq!(state.action, Projected::Value(HumidifierAction::Drying));
        assert_eq!(state.target_humidity, Some(55.0));
        assert_eq!(entity.device_class(), Some("dehumidifier"));
    }

    #[test]
    fn zero_power_reads_off() {
        let entity = entity();
        let state = entity.project(&appliance(&[("t_power", 0)]), None);
        assert!(!state.is_on);
    }

    #[test]
    fn humidity_bounds_come_from_schema() {
        let entity = entity();
        assert_eq!(entity.min_humidity(), Some(30.0));
        assert_eq!(entity.max_humidity(), Some(80.0));
    }
}
