//! Command composition: typed intents → raw property writes.
//!
//! Composition is strict where projection is lenient: an intent that cannot
//! be expressed through the schema's reverse tables fails with
//! [`BridgeError::InvalidInput`] before anything reaches the network.

use crate::client::StatusValue;
use crate::dictionary::{ClimateTarget, HumidifierTarget, SelectSpec, SwitchSpec, WaterHeaterTarget};
use crate::error::{BridgeError, Result};
use crate::state::{
    ClimateEntity, ClimateState, HumidifierEntity, HvacMode, WaterHeaterEntity,
};
use std::collections::HashMap;

/// Raw property that suppresses the appliance's confirmation beep.
pub const DISABLE_BEEP_PROPERTY: &str = "DisableBeep";

/// Value written to [`DISABLE_BEEP_PROPERTY`] to keep the appliance quiet.
pub const DISABLE_BEEP_VALUE: &str = "1";

/// One composed write: wire payload plus the optimistic status patch the
/// coordinator applies after the cloud accepts the write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteRequest {
    /// Properties sent to the cloud, all values stringified.
    pub writes: HashMap<String, String>,
    /// Expected raw status after the write, keyed by status key.
    pub status_patch: HashMap<String, StatusValue>,
    /// Preset the write activates. Callers holding a [`ClimateState`] feed
    /// this to [`ClimateState::apply_preset_hint`] before re-projecting, so
    /// the commanded preset wins over another one whose signature overlaps.
    pub preset_hint: Option<String>,
}

impl WriteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write whose status key equals the wire key.
    pub fn set(&mut self, key: &str, code: i64) {
        self.writes.insert(key.to_string(), code.to_string());
        self.status_patch
            .insert(key.to_string(), StatusValue::Int(code));
    }

    /// Record a write where the wire key differs from the status key.
    pub fn set_command(&mut self, wire_key: &str, wire_value: i64, status_key: &str, status_value: i64) {
        self.writes
            .insert(wire_key.to_string(), wire_value.to_string());
        self.status_patch
            .insert(status_key.to_string(), StatusValue::Int(status_value));
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Typed climate intents.
#[derive(Debug, Clone, PartialEq)]
pub enum ClimateCommand {
    TurnOn,
    TurnOff,
    SetHvacMode(HvacMode),
    SetFanMode(String),
    SetSwingMode(String),
    SetPreset(String),
    SetTargetTemperature(f64),
    SetTargetHumidity(f64),
}

/// Typed water heater intents.
#[derive(Debug, Clone, PartialEq)]
pub enum WaterHeaterCommand {
    TurnOn,
    TurnOff,
    SetOperationMode(String),
    SetAwayMode(bool),
    SetTargetTemperature(f64),
}

/// Typed humidifier intents.
#[derive(Debug, Clone, PartialEq)]
pub enum HumidifierCommand {
    TurnOn,
    TurnOff,
    SetMode(String),
    SetTargetHumidity(f64),
}

fn round(value: f64) -> i64 {
    value.round() as i64
}

/// Compose a climate command against the entity's schema binding.
///
/// The current state supplies the target temperature that is re-asserted on
/// power-on and mode changes, since some models reset it otherwise.
pub fn compose_climate(
    entity: &ClimateEntity,
    state: &ClimateState,
    command: &ClimateCommand,
) -> Result<WriteRequest> {
    let mut request = WriteRequest::new();
    match command {
        ClimateCommand::TurnOff | ClimateCommand::SetHvacMode(HvacMode::Off) => {
            let key = entity
                .key(ClimateTarget::IsOn)
                .ok_or_else(|| BridgeError::invalid_input("model has no power property"))?;
            request.set(key, 0);
        }
        ClimateCommand::TurnOn => {
            let key = entity
                .key(ClimateTarget::IsOn)
                .ok_or_else(|| BridgeError::invalid_input("model has no power property"))?;
            request.set(key, 1);
            add_target_temperature(entity, state, &mut request);
        }
        ClimateCommand::SetHvacMode(mode) => {
            if let Some(key) = entity.key(ClimateTarget::IsOn) {
                request.set(key, 1);
            }
            if let Some(key) = entity.key(ClimateTarget::HvacMode) {
                let code = entity.hvac_mode_code(*mode).ok_or_else(|| {
                    BridgeError::invalid_input(format!("hvac mode {mode} is not supported"))
                })?;
                request.set(key, code);
            } else if entity.key(ClimateTarget::IsOn).is_none() {
                return Err(BridgeError::invalid_input("model has no hvac mode property"));
            }
            add_target_temperature(entity, state, &mut request);
        }
        ClimateCommand::SetFanMode(label) => {
            let key = entity
                .key(ClimateTarget::FanMode)
                .ok_or_else(|| BridgeError::invalid_input("model has no fan mode property"))?;
            let code = entity.fan_mode_code(label).ok_or_else(|| {
                BridgeError::invalid_input(format!("fan mode {label:?} is not supported"))
            })?;
            request.set(key, code);
        }
        ClimateCommand::SetSwingMode(label) => {
            let key = entity
                .key(ClimateTarget::SwingMode)
                .ok_or_else(|| BridgeError::invalid_input("model has no swing mode property"))?;
            let code = entity.swing_mode_code(label).ok_or_else(|| {
                BridgeError::invalid_input(format!("swing mode {label:?} is not supported"))
            })?;
            request.set(key, code);
        }
        ClimateCommand::SetPreset(name) => {
            let preset = entity
                .presets()
                .iter()
                .find(|p| &p.name == name)
                .ok_or_else(|| {
                    BridgeError::invalid_input(format!("preset {name:?} is not defined"))
                })?;
            for (key, code) in &preset.signature {
                request.set(key, *code);
            }
            request.preset_hint = Some(preset.name.clone());
        }
        ClimateCommand::SetTargetTemperature(value) => {
            let key = entity.key(ClimateTarget::TargetTemperature).ok_or_else(|| {
                BridgeError::invalid_input("model has no target temperature property")
            })?;
            request.set(key, round(*value));
        }
        ClimateCommand::SetTargetHumidity(value) => {
            let key = entity.key(ClimateTarget::TargetHumidity).ok_or_else(|| {
                BridgeError::invalid_input("model has no target humidity property")
            })?;
            request.set(key, round(*value));
        }
    }
    Ok(request)
}

/// Re-assert the known target temperature alongside power/mode writes.
fn add_target_temperature(entity: &ClimateEntity, state: &ClimateState, request: &mut WriteRequest) {
    if let (Some(key), Some(value)) = (
        entity.key(ClimateTarget::TargetTemperature),
        state.target_temperature,
    ) {
        request.set(key, round(value));
    }
}

/// Compose a water heater command against the entity's schema binding.
pub fn compose_water_heater(
    entity: &WaterHeaterEntity,
    command: &WaterHeaterCommand,
) -> Result<WriteRequest> {
    let mut request = WriteRequest::new();
    match command {
        WaterHeaterCommand::TurnOn => {
            if let (Some(key), Some(code)) =
                (entity.key(WaterHeaterTarget::State), entity.state_on_code())
            {
                request.set(key, code);
            } else if let Some(key) = entity.key(WaterHeaterTarget::IsOn) {
                request.set(key, 1);
            } else {
                return Err(BridgeError::invalid_input("model has no power property"));
            }
        }
        WaterHeaterCommand::TurnOff => {
            if let (Some(key), Some(code)) = (
                entity.key(WaterHeaterTarget::State),
                entity.state_code(crate::state::water_heater::OPERATION_OFF),
            ) {
                request.set(key, code);
            } else if let Some(key) = entity.key(WaterHeaterTarget::IsOn) {
                request.set(key, 0);
            } else {
                return Err(BridgeError::invalid_input("model has no power property"));
            }
        }
        WaterHeaterCommand::SetOperationMode(label) => {
            if entity.has_operation_table() {
                let key = entity
                    .key(WaterHeaterTarget::CurrentOperation)
                    .ok_or_else(|| BridgeError::invalid_input("model has no operation property"))?;
                let code = entity.operation_code(label).ok_or_else(|| {
                    BridgeError::invalid_input(format!("operation {label:?} is not supported"))
                })?;
                request.set(key, code);
            } else if let (Some(key), Some(code)) =
                (entity.key(WaterHeaterTarget::State), entity.state_code(label))
            {
                request.set(key, code);
            } else {
                // Pseudo-operations synthesized from the power target.
                return match label.as_str() {
                    crate::state::water_heater::OPERATION_OFF => {
                        compose_water_heater(entity, &WaterHeaterCommand::TurnOff)
                    }
                    crate::state::water_heater::OPERATION_ON => {
                        compose_water_heater(entity, &WaterHeaterCommand::TurnOn)
                    }
                    _ => Err(BridgeError::invalid_input(format!(
                        "operation {label:?} is not supported"
                    ))),
                };
            }
        }
        WaterHeaterCommand::SetAwayMode(away) => {
            let key = entity
                .key(WaterHeaterTarget::IsAwayModeOn)
                .ok_or_else(|| BridgeError::invalid_input("model has no away mode property"))?;
            let code = entity.away_code(*away).ok_or_else(|| {
                BridgeError::invalid_input(format!("away mode {away} has no raw code"))
            })?;
            request.set(key, code);
        }
        WaterHeaterCommand::SetTargetTemperature(value) => {
            let key = entity.key(WaterHeaterTarget::TargetTemperature).ok_or_else(|| {
                BridgeError::invalid_input("model has no target temperature property")
            })?;
            request.set(key, round(*value));
        }
    }
    Ok(request)
}

/// Compose a humidifier command against the entity's schema binding.
pub fn compose_humidifier(
    entity: &HumidifierEntity,
    command: &HumidifierCommand,
) -> Result<WriteRequest> {
    let mut request = WriteRequest::new();
    match command {
        HumidifierCommand::TurnOn | HumidifierCommand::TurnOff => {
            let key = entity
                .key(HumidifierTarget::IsOn)
                .ok_or_else(|| BridgeError::invalid_input("model has no power property"))?;
            let code = i64::from(matches!(command, HumidifierCommand::TurnOn));
            request.set(key, code);
        }
        HumidifierCommand::SetMode(label) => {
            let key = entity
                .key(HumidifierTarget::Mode)
                .ok_or_else(|| BridgeError::invalid_input("model has no mode property"))?;
            let code = entity.mode_code(label).ok_or_else(|| {
                BridgeError::invalid_input(format!("mode {label:?} is not supported"))
            })?;
            request.set(key, code);
        }
        HumidifierCommand::SetTargetHumidity(value) => {
            let key = entity.key(HumidifierTarget::TargetHumidity).ok_or_else(|| {
                BridgeError::invalid_input("model has no target humidity property")
            })?;
            request.set(key, round(*value));
        }
    }
    Ok(request)
}

/// Compose a switch flip.
///
/// Some models take the command on a different raw key than the one that
/// reports the position, with an offset between command and status values.
pub fn compose_switch(status_key: &str, spec: &SwitchSpec, on: bool) -> WriteRequest {
    let status_value = if on { spec.on } else { spec.off };
    let wire_value = status_value - spec.command_adjust;
    let wire_key = spec.command_name.as_deref().unwrap_or(status_key);

    let mut request = WriteRequest::new();
    request.set_command(wire_key, wire_value, status_key, status_value);
    request
}

/// Compose a select choice, strict on the option label.
pub fn compose_select(key: &str, spec: &SelectSpec, label: &str) -> Result<WriteRequest> {
    let code = spec
        .options
        .iter()
        .rev()
        .find(|(_, l)| l.as_str() == label)
        .map(|(c, _)| *c)
        .ok_or_else(|| BridgeError::invalid_input(format!("option {label:?} is not defined")))?;
    let mut request = WriteRequest::new();
    request.set(key, code);
    Ok(request)
}

/// Compose a number write, rounding to the raw integer scale.
pub fn compose_number(key: &str, value: f64) -> WriteRequest {
    let mut request = WriteRequest::new();
    request.set(key, round(value));
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Appliance;
    use crate::dictionary::parse_dictionary;
    use crate::state::{ClimateEntity, WaterHeaterEntity};

    fn climate_entity() -> ClimateEntity {
        let dictionary = parse_dictionary(
            "009-109",
            r#"{
                "climate": { "presets": [ { "preset": "eco", "t_work_mode": 2, "t_eco": 1 } ] },
                "properties": [
                    { "property": "t_power", "climate": { "target": "is_on" } },
                    { "property": "t_work_mode",
                      "climate": { "target": "hvac_mode",
                                   "options": { "1": "heat", "2": "cool" } } },
                    { "property": "t_fan_speed",
                      "climate": { "target": "fan_mode",
                                   "options": { "0": "auto", "5": "low" } } },
                    { "property": "t_temp",
                      "climate": { "target": "target_temperature" } }
                ]
            }"#,
        )
        .unwrap();
        ClimateEntity::from_dictionary("009-109", &dictionary).unwrap()
    }

    fn state_with_temperature(value: f64) -> ClimateState {
        ClimateState {
            target_temperature: Some(value),
            ..ClimateState::default()
        }
    }

    #[test]
    fn set_mode_asserts_power_and_temperature() {
        let entity = climate_entity();
        let request = compose_climate(
            &entity,
            &state_with_temperature(21.6),
            &ClimateCommand::SetHvacMode(HvacMode::Heat),
        )
        .unwrap();
        assert_eq!(request.writes.get("t_power").map(String::as_str), Some("1"));
        assert_eq!(request.writes.get("t_work_mode").map(String::as_str), Some("1"));
        assert_eq!(request.writes.get("t_temp").map(String::as_str), Some("22"));
    }

    #[test]
    fn off_mode_is_a_power_write() {
        let entity = climate_entity();
        let request = compose_climate(
            &entity,
            &ClimateState::default(),
            &ClimateCommand::SetHvacMode(HvacMode::Off),
        )
        .unwrap();
        assert_eq!(request.writes.get("t_power").map(String::as_str), Some("0"));
        assert!(!request.writes.contains_key("t_work_mode"));
    }

    #[test]
    fn unsupported_mode_is_rejected_before_the_network() {
        let entity = climate_entity();
        let err = compose_climate(
            &entity,
            &ClimateState::default(),
            &ClimateCommand::SetHvacMode(HvacMode::Dry),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[test]
    fn unknown_fan_mode_is_rejected() {
        let entity = climate_entity();
        let err = compose_climate(
            &entity,
            &ClimateState::default(),
            &ClimateCommand::SetFanMode("turbo".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[test]
    fn preset_writes_the_full_signature() {
        let entity = climate_entity();
        let request = compose_climate(
            &entity,
            &ClimateState::default(),
            &ClimateCommand::SetPreset("eco".to_string()),
        )
        .unwrap();
        assert_eq!(request.writes.get("t_work_mode").map(String::as_str), Some("2"));
        assert_eq!(request.writes.get("t_eco").map(String::as_str), Some("1"));
    }

    #[test]
    fn commanded_preset_pins_the_stay_rule() {
        let dictionary = parse_dictionary(
            "009-109",
            r#"{
                "climate": { "presets": [
                    { "preset": "eco", "t_work_mode": 2, "t_eco": 1 },
                    { "preset": "boost", "t_work_mode": 2 }
                ] },
                "properties": [
                    { "property": "t_power", "climate": { "target": "is_on" } },
                    { "property": "t_work_mode",
                      "climate": { "target": "hvac_mode",
                                   "options": { "1": "heat", "2": "cool" } } }
                ]
            }"#,
        )
        .unwrap();
        let entity = ClimateEntity::from_dictionary("009-109", &dictionary).unwrap();

        let mut appliance = Appliance {
            device_id: "d1".into(),
            puid: "p1".into(),
            device_type_code: "009".into(),
            device_feature_code: "109".into(),
            device_feature_name: String::new(),
            device_nick_name: String::new(),
            room_name: String::new(),
            offline_state: 1,
            status_list: [
                ("t_power".to_string(), StatusValue::Int(1)),
                ("t_work_mode".to_string(), StatusValue::Int(2)),
                ("t_eco".to_string(), StatusValue::Int(0)),
            ]
            .into(),
        };
        let mut state = entity.project(&appliance, None);
        assert_eq!(state.preset.as_deref(), Some("boost"));

        let request = compose_climate(
            &entity,
            &state,
            &ClimateCommand::SetPreset("eco".to_string()),
        )
        .unwrap();
        assert_eq!(request.preset_hint.as_deref(), Some("eco"));

        // After the accepted write, boost's signature still matches the
        // patched status; the hint makes the commanded preset win anyway.
        appliance.status_list.extend(request.status_patch.clone());
        state.apply_preset_hint(request.preset_hint.as_deref());
        let state = entity.project(&appliance, Some(&state));
        assert_eq!(state.preset.as_deref(), Some("eco"));
    }

    #[test]
    fn switch_command_key_and_adjust() {
        let spec = SwitchSpec {
            command_name: Some("t_beep_cmd".to_string()),
            command_adjust: 1,
            off: 1,
            on: 2,
            ..Default::default()
        };
        let request = compose_switch("t_beep", &spec, true);
        assert_eq!(request.writes.get("t_beep_cmd").map(String::as_str), Some("1"));
        assert_eq!(request.status_patch.get("t_beep"), Some(&StatusValue::Int(2)));
        assert!(!request.writes.contains_key("t_beep"));
    }

    #[test]
    fn water_heater_on_off_through_state_table() {
        let dictionary = parse_dictionary(
            "035-010",
            r#"{ "properties": [
                { "property": "t_sw",
                  "water_heater": { "target": "state",
                                    "options": { "0": "off", "1": "eco", "2": "performance" } } }
            ] }"#,
        )
        .unwrap();
        let entity = WaterHeaterEntity::from_dictionary("035-010", &dictionary).unwrap();

        let on = compose_water_heater(&entity, &WaterHeaterCommand::TurnOn).unwrap();
        assert_eq!(on.writes.get("t_sw").map(String::as_str), Some("1"));

        let off = compose_water_heater(&entity, &WaterHeaterCommand::TurnOff).unwrap();
        assert_eq!(off.writes.get("t_sw").map(String::as_str), Some("0"));

        let eco =
            compose_water_heater(&entity, &WaterHeaterCommand::SetOperationMode("eco".into()))
                .unwrap();
        assert_eq!(eco.writes.get("t_sw").map(String::as_str), Some("1"));
    }

    #[test]
    fn select_label_must_exist() {
        let spec = SelectSpec {
            options: [(1, "low".to_string()), (2, "high".to_string())].into(),
        };
        let request = compose_select("t_level", &spec, "high").unwrap();
        assert_eq!(request.writes.get("t_level").map(String::as_str), Some("2"));
        assert!(compose_select("t_level", &spec, "medium").is_err());
    }
}
