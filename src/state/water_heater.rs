//! Water heater entity: schema binding and state projection.

use super::{reverse_table, temperature_bound_map, Projected, TemperatureUnit};
use crate::client::Appliance;
use crate::dictionary::{Capability, Dictionary, WaterHeaterTarget};
use std::collections::HashMap;
use tracing::warn;

/// Label reported for the powered-down operation.
pub const OPERATION_OFF: &str = "off";

/// Pseudo-operation used when only a power target is declared.
pub const OPERATION_ON: &str = "on";

#[derive(Debug, Clone, PartialEq)]
pub struct WaterHeaterState {
    pub available: bool,
    pub is_on: bool,
    /// Operating state from the state table, or an on/off pseudo-operation.
    pub state: Projected<String>,
    pub current_operation: Projected<String>,
    pub is_away_mode_on: Projected<bool>,
    pub target_temperature: Option<f64>,
    pub temperature_unit: TemperatureUnit,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
}

impl Default for WaterHeaterState {
    fn default() -> Self {
        Self {
            available: true,
            is_on: true,
            state: Projected::Unset,
            current_operation: Projected::Unset,
            is_away_mode_on: Projected::Unset,
            target_temperature: None,
            temperature_unit: TemperatureUnit::Celsius,
            min_temperature: None,
            max_temperature: None,
        }
    }
}

#[derive(Debug)]
pub struct WaterHeaterEntity {
    target_keys: HashMap<WaterHeaterTarget, String>,
    unknown_values: HashMap<String, i64>,
    state_table: HashMap<i64, String>,
    state_reverse: HashMap<String, i64>,
    operation_table: HashMap<i64, String>,
    operation_reverse: HashMap<String, i64>,
    away_on_code: Option<i64>,
    away_off_code: Option<i64>,
    temperature_unit_table: HashMap<i64, TemperatureUnit>,
    min_temperature: HashMap<TemperatureUnit, f64>,
    max_temperature: HashMap<TemperatureUnit, f64>,
    /// Declared operations, or synthesized on/off when only power exists.
    operation_list: Vec<String>,
}

impl WaterHeaterEntity {
    pub fn from_dictionary(model_key: &str, dictionary: &Dictionary) -> Option<Self> {
        let mut entity = WaterHeaterEntity {
            target_keys: HashMap::new(),
            unknown_values: HashMap::new(),
            state_table: HashMap::new(),
            state_reverse: HashMap::new(),
            operation_table: HashMap::new(),
            operation_reverse: HashMap::new(),
            away_on_code: None,
            away_off_code: None,
            temperature_unit_table: HashMap::new(),
            min_temperature: HashMap::new(),
            max_temperature: HashMap::new(),
            operation_list: Vec::new(),
        };

        let mut bound_any = false;
        for descriptor in dictionary.properties() {
            let Capability::WaterHeater(spec) = &descriptor.capability else {
                continue;
            };
            bound_any = true;
            let Some(target) = spec.target else { continue };

            if let Some(previous) = entity
                .target_keys
                .insert(target, descriptor.name.clone())
            {
                warn!(model_key, ?target, previous = %previous, kept = %descriptor.name,
                      "duplicate water heater target");
            }
            if let Some(sentinel) = spec.unknown_value {
                entity.unknown_values.insert(descriptor.name.clone(), sentinel);
            }

            let context = format!("{model_key}:{}", descriptor.name);
            match target {
                WaterHeaterTarget::State => {
                    entity.state_table =
                        spec.options.iter().map(|(c, l)| (*c, l.clone())).collect();
                    entity.state_reverse = reverse_table(&context, &spec.options);
                }
                WaterHeaterTarget::CurrentOperation => {
                    entity.operation_table =
                        spec.options.iter().map(|(c, l)| (*c, l.clone())).collect();
                    entity.operation_reverse = reverse_table(&context, &spec.options);
                }
                WaterHeaterTarget::IsAwayModeOn => {
                    // Away tables map raw codes to boolean labels.
                    for (code, label) in &spec.options {
                        match label.as_str() {
                            "true" => entity.away_on_code = Some(*code),
                            "false" => entity.away_off_code = Some(*code),
                            other => {
                                warn!(model_key, property = %descriptor.name, label = %other,
                                      "away mode option is not a boolean");
                            }
                        }
                    }
                }
                WaterHeaterTarget::TemperatureUnit => {
                    for (code, label) in &spec.options {
                        match TemperatureUnit::normalize(label) {
                            Some(unit) => {
                                entity.temperature_unit_table.insert(*code, unit);
                            }
                            None => {
                                warn!(model_key, property = %descriptor.name, label = %label,
                                      "unrecognized temperature unit label");
                            }
                        }
                    }
                }
                WaterHeaterTarget::TargetTemperature => {
                    entity.min_temperature =
                        temperature_bound_map(&context, spec.min_value.as_ref());
                    entity.max_temperature =
                        temperature_bound_map(&context, spec.max_value.as_ref());
                }
                WaterHeaterTarget::IsOn => {}
            }
        }

        if !bound_any {
            return None;
        }

        entity.operation_list = if !entity.operation_table.is_empty() {
            entity.operation_table.values().cloned().collect()
        } else if entity.target_keys.contains_key(&WaterHeaterTarget::IsOn) {
            vec![OPERATION_OFF.to_string(), OPERATION_ON.to_string()]
        } else {
            Vec::new()
        };

        Some(entity)
    }

    pub fn key(&self, target: WaterHeaterTarget) -> Option<&str> {
        self.target_keys.get(&target).map(String::as_str)
    }

    pub fn operation_list(&self) -> &[String] {
        &self.operation_list
    }

    /// Raw code for the first state-table label that is not "off".
    pub(crate) fn state_on_code(&self) -> Option<i64> {
        self.state_table
            .iter()
            .filter(|(_, label)| label.as_str() != OPERATION_OFF)
            .map(|(code, _)| *code)
            .min()
    }

    pub(crate) fn state_code(&self, label: &str) -> Option<i64> {
        self.state_reverse.get(label).copied()
    }

    pub(crate) fn operation_code(&self, label: &str) -> Option<i64> {
        self.operation_reverse.get(label).copied()
    }

    pub(crate) fn away_code(&self, away: bool) -> Option<i64> {
        if away {
            self.away_on_code
        } else {
            self.away_off_code
        }
    }

    pub(crate) fn has_operation_table(&self) -> bool {
        !self.operation_table.is_empty()
    }

    fn code(&self, appliance: &Appliance, target: WaterHeaterTarget) -> Option<i64> {
        let key = self.target_keys.get(&target)?;
        let code = appliance.status_list.get(key)?.as_code()?;
        if self.unknown_values.get(key) == Some(&code) {
            return None;
        }
        Some(code)
    }

    pub fn project(
        &self,
        appliance: &Appliance,
        previous: Option<&WaterHeaterState>,
    ) -> WaterHeaterState {
        let mut state = previous.cloned().unwrap_or_default();
        let status = &appliance.status_list;

        state.is_on = true;
        if let Some(key) = self.target_keys.get(&WaterHeaterTarget::IsOn) {
            if let Some(code) = status.get(key).and_then(|v| v.as_code()) {
                state.is_on = code != 0;
            }
        }

        if self.target_keys.contains_key(&WaterHeaterTarget::State) {
            if let Some(code) = self.code(appliance, WaterHeaterTarget::State) {
                state.state = match self.state_table.get(&code) {
                    Some(label) => Projected::Value(label.clone()),
                    None => {
                        warn!(device = %appliance.device_id, code,
                              "raw water heater state has no option entry");
                        Projected::Unmapped
                    }
                };
            }
        }

        if self.target_keys.contains_key(&WaterHeaterTarget::CurrentOperation) {
            if let Some(code) = self.code(appliance, WaterHeaterTarget::CurrentOperation) {
                state.current_operation = match self.operation_table.get(&code) {
                    Some(label) => Projected::Value(label.clone()),
                    None => {
                        warn!(device = %appliance.device_id, code,
                              "raw water heater operation has no option entry");
                        Projected::Unmapped
                    }
                };
            }
        } else if self.target_keys.contains_key(&WaterHeaterTarget::IsOn) {
            // Pseudo-operation derived from the power flag.
            let label = if state.is_on { OPERATION_ON } else { OPERATION_OFF };
            state.current_operation = Projected::Value(label.to_string());
        }

        if self.target_keys.contains_key(&WaterHeaterTarget::IsAwayModeOn) {
            if let Some(code) = self.code(appliance, WaterHeaterTarget::IsAwayModeOn) {
                state.is_away_mode_on = if Some(code) == self.away_on_code {
                    Projected::Value(true)
                } else if Some(code) == self.away_off_code {
                    Projected::Value(false)
                } else {
                    Projected::Unmapped
                };
            }
        }

        if let Some(key) = self.target_keys.get(&WaterHeaterTarget::TemperatureUnit) {
            if let Some(code) = self.code(appliance, WaterHeaterTarget::TemperatureUnit) {
                match self.temperature_unit_table.get(&code) {
                    Some(unit) => state.temperature_unit = *unit,
                    None => {
                        warn!(device = %appliance.device_id, property = %key, code,
                              "raw temperature unit has no option entry");
                    }
                }
            }
        }
        state.min_temperature = self
            .min_temperature
            .get(&state.temperature_unit)
            .copied()
            .or(state.min_temperature);
        state.max_temperature = self
            .max_temperature
            .get(&state.temperature_unit)
            .copied()
            .or(state.max_temperature);

        if let Some(key) = self.target_keys.get(&WaterHeaterTarget::TargetTemperature) {
            if let Some(value) = status.get(key) {
                state.target_temperature = match value.as_code() {
                    Some(code) if self.unknown_values.get(key) == Some(&code) => None,
                    _ => value.as_number(),
                };
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
            { "property": "t_sw",
              "water_heater": { "target": "state",
                                "options": { "0": "off", "1": "eco", "2": "performance" } } },
            { "property": "t_away",
              "water_heater": { "target": "is_away_mode_on",
                                "options": { "0": false, "1": true } } },
            { "property": "t_temp",
              "water_heater": { "target": "target_temperature",
                                "min_value": { "°C": 35.0 },
                                "max_value": { "°C": 65.0 } } }
        ]
    }"#;

    fn appliance(status: &[(&str, i64)]) -> Appliance {
        Appliance {
            device_id: "w1".into(),
            puid: "pw1".into(),
            device_type_code: "035".into(),
            device_feature_code: "010".into(),
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

    fn entity() -> WaterHeaterEntity {
        let dictionary = parse_dictionary("035-010", SCHEMA).unwrap();
        WaterHeaterEntity::from_dictionary("035-010", &dictionary).unwrap()
    }

    #[test]
    fn state_and_away_project() {
        let entity = entity();
        let state = entity.project(&appliance(&[("t_sw", 1), ("t_away", 1)]), None);
        assert_eq!(state.state, Projected::Value("eco".to_string()));
        assert_eq!(state.is_away_mode_on, Projected::Value(true));

        let state = entity.project(&appliance(&[("t_sw", 0), ("t_away", 0)]), Some(&state));
        assert_eq!(state.state, Projected::Value("off".to_string()));
        assert_eq!(state.is_away_mode_on, Projected::Value(false));
    }

    #[test]
    fn state_on_code_skips_off() {
        let entity = entity();
        assert_eq!(entity.state_on_code(), Some(1));
    }

    #[test]
    fn bounds_follow_unit() {
        let entity = entity();
        let state = entity.project(&appliance(&[("t_temp", 50)]), None);
        assert_eq!(state.target_temperature, Some(50.0));
        assert_eq!(state.min_temperature, Some(35.0));
        assert_eq!(state.max_temperature, Some(65.0));
    }

    #[test]
    fn power_only_model_synthesizes_operations() {
        let dictionary = parse_dictionary(
            "035-011",
            r#"{ "properties": [
                { "property": "t_power", "water_heater": { "target": "is_on" } }
            ] }"#,
        )
        .unwrap();
        let entity = WaterHeaterEntity::from_dictionary("035-011", &dictionary).unwrap();
        assert_eq!(entity.operation_list(), ["off", "on"]);

        let state = entity.project(&appliance(&[("t_power", 0)]), None);
        assert!(!state.is_on);
        assert_eq!(state.current_operation, Projected::Value("off".to_string()));
    }
}
