//! Dictionary schema parsing.
//!
//! Document-level JSON errors fail the parse (the store then falls back to an
//! empty dictionary); structurally invalid capability fragments never do.
//! Each anomaly is logged and the offending attribute degraded to a safe
//! default so one malformed property cannot prevent the rest of the model's
//! schema from loading.

use super::{
    BinarySensorSpec, Capability, ClimateSpec, ClimateTarget, Dictionary, HumidifierSpec,
    HumidifierTarget, NumberSpec, NumericBound, OptionTable, Preset, PropertyDescriptor,
    SelectSpec, SensorSpec, SwitchSpec, WaterHeaterSpec, WaterHeaterTarget,
};
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Device classes that represent a unitless scale.
const UNITLESS_DEVICE_CLASSES: &[&str] = &["aqi", "ph", "date", "timestamp"];

const ENUM_DEVICE_CLASS: &str = "enum";

#[derive(Debug, Default, Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    climate: Option<ClimateSection>,
    #[serde(default)]
    properties: Vec<PropertyEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ClimateSection {
    #[serde(default)]
    presets: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct PropertyEntry {
    property: String,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    hide: bool,
    #[serde(default)]
    disable: bool,
    #[serde(default)]
    unavailable: Option<i64>,

    #[serde(default)]
    binary_sensor: Option<RawBinarySensor>,
    #[serde(default)]
    climate: Option<RawComposite>,
    #[serde(default)]
    humidifier: Option<RawHumidifier>,
    #[serde(default)]
    number: Option<RawNumber>,
    #[serde(default)]
    sensor: Option<RawSensor>,
    #[serde(default)]
    select: Option<RawSelect>,
    #[serde(default)]
    switch: Option<RawSwitch>,
    #[serde(default)]
    water_heater: Option<RawComposite>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBinarySensor {
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    options: Option<BTreeMap<i64, bool>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSensor {
    #[serde(default)]
    unknown_value: Option<i64>,
    #[serde(default)]
    read_only: Option<bool>,
    #[serde(default)]
    multiplier: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    state_class: Option<String>,
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    options: Option<OptionTable>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSwitch {
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    off: Option<i64>,
    #[serde(default)]
    on: Option<i64>,
    #[serde(default)]
    command_name: Option<String>,
    #[serde(default)]
    command_adjust: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSelect {
    #[serde(default)]
    options: Option<OptionTable>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNumber {
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    device_class: Option<String>,
}

/// Shared raw shape for climate and water_heater blocks.
///
/// Option labels are usually strings, but away-mode tables use booleans;
/// everything is coerced to a label.
#[derive(Debug, Default, Deserialize)]
struct RawComposite {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    options: Option<BTreeMap<i64, Value>>,
    #[serde(default)]
    unknown_value: Option<i64>,
    #[serde(default)]
    min_value: Option<NumericBound>,
    #[serde(default)]
    max_value: Option<NumericBound>,
}

fn coerce_options(raw: BTreeMap<i64, Value>) -> OptionTable {
    raw.into_iter()
        .map(|(code, value)| {
            let label = match value {
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            (code, label)
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct RawHumidifier {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    options: Option<OptionTable>,
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
}

pub(super) fn parse_dictionary(model_key: &str, raw: &str) -> Result<Dictionary> {
    let file: DictionaryFile = serde_json::from_str(raw)?;

    let mut properties = HashMap::new();
    for entry in file.properties {
        let descriptor = build_descriptor(model_key, entry);
        properties.insert(descriptor.name.clone(), descriptor);
    }

    let presets = file
        .climate
        .map(|section| build_presets(model_key, section.presets))
        .unwrap_or_default();

    Ok(Dictionary::new(properties, presets))
}

fn build_descriptor(model_key: &str, entry: PropertyEntry) -> PropertyDescriptor {
    let name = entry.property;

    let blocks_present = [
        entry.binary_sensor.is_some(),
        entry.climate.is_some(),
        entry.humidifier.is_some(),
        entry.number.is_some(),
        entry.sensor.is_some(),
        entry.select.is_some(),
        entry.switch.is_some(),
        entry.water_heater.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    if blocks_present > 1 {
        warn!(model_key, property = %name, "multiple capability blocks, keeping the first");
    }

    let capability = if let Some(raw) = entry.binary_sensor {
        Capability::BinarySensor(BinarySensorSpec {
            device_class: raw.device_class,
            options: raw.options.unwrap_or_else(|| BinarySensorSpec::default().options),
        })
    } else if let Some(raw) = entry.climate {
        Capability::Climate(build_climate(model_key, &name, raw))
    } else if let Some(raw) = entry.humidifier {
        Capability::Humidifier(build_humidifier(model_key, &name, raw))
    } else if let Some(raw) = entry.number {
        Capability::Number(build_number(model_key, &name, raw))
    } else if let Some(raw) = entry.sensor {
        Capability::Sensor(build_sensor(model_key, &name, raw))
    } else if let Some(raw) = entry.select {
        let options = raw.options.unwrap_or_else(|| {
            warn!(model_key, property = %name, "select has no options");
            OptionTable::new()
        });
        Capability::Select(SelectSpec { options })
    } else if let Some(raw) = entry.switch {
        Capability::Switch(SwitchSpec {
            device_class: raw.device_class,
            off: raw.off.unwrap_or(0),
            on: raw.on.unwrap_or(1),
            command_name: raw.command_name,
            command_adjust: raw.command_adjust.unwrap_or(0),
        })
    } else if let Some(raw) = entry.water_heater {
        Capability::WaterHeater(build_water_heater(model_key, &name, raw))
    } else {
        // No capability block: plain sensor.
        Capability::Sensor(SensorSpec::default())
    };

    PropertyDescriptor {
        name,
        icon: entry.icon,
        hide: entry.hide,
        disable: entry.disable,
        unavailable: entry.unavailable,
        capability,
    }
}

fn build_climate(model_key: &str, name: &str, raw: RawComposite) -> ClimateSpec {
    let target = match raw.target.as_deref() {
        None => {
            warn!(model_key, property = %name, "missing climate.target");
            None
        }
        Some(label) => match parse_target::<ClimateTarget>(label) {
            Some(target) => Some(target),
            None => {
                warn!(model_key, property = %name, target = label, "unknown climate.target");
                None
            }
        },
    };

    let options = raw.options.map(coerce_options).unwrap_or_else(|| {
        if target.is_some_and(|t| t.is_enumerated()) {
            warn!(model_key, property = %name, "missing climate.options");
        }
        OptionTable::new()
    });

    ClimateSpec {
        target,
        options,
        unknown_value: raw.unknown_value,
        min_value: raw.min_value,
        max_value: raw.max_value,
    }
}

fn build_humidifier(model_key: &str, name: &str, raw: RawHumidifier) -> HumidifierSpec {
    let target = match raw.target.as_deref() {
        None => {
            warn!(model_key, property = %name, "missing humidifier.target");
            None
        }
        Some(label) => match parse_target::<HumidifierTarget>(label) {
            Some(target) => Some(target),
            None => {
                warn!(model_key, property = %name, target = label, "unknown humidifier.target");
                None
            }
        },
    };

    let options = raw.options.unwrap_or_else(|| {
        if target.is_some_and(|t| t.is_enumerated()) {
            warn!(model_key, property = %name, "missing humidifier.options");
        }
        OptionTable::new()
    });

    HumidifierSpec {
        target,
        options,
        device_class: raw.device_class,
        min_value: raw.min_value,
        max_value: raw.max_value,
    }
}

fn build_water_heater(model_key: &str, name: &str, raw: RawComposite) -> WaterHeaterSpec {
    let target = match raw.target.as_deref() {
        None => {
            warn!(model_key, property = %name, "missing water_heater.target");
            None
        }
        Some(label) => match parse_target::<WaterHeaterTarget>(label) {
            Some(target) => Some(target),
            None => {
                warn!(model_key, property = %name, target = label, "unknown water_heater.target");
                None
            }
        },
    };

    let options = raw.options.map(coerce_options).unwrap_or_else(|| {
        if target.is_some_and(|t| t.is_enumerated()) {
            warn!(model_key, property = %name, "missing water_heater.options");
        }
        OptionTable::new()
    });

    if target == Some(WaterHeaterTarget::State) {
        if !options.values().any(|label| label == "off") {
            warn!(model_key, property = %name, "water_heater state options lack \"off\"");
        }
        if options.len() < 2 {
            warn!(model_key, property = %name, "water_heater state needs at least 2 options");
        }
    }

    WaterHeaterSpec {
        target,
        options,
        unknown_value: raw.unknown_value,
        min_value: raw.min_value,
        max_value: raw.max_value,
    }
}

fn build_sensor(model_key: &str, name: &str, raw: RawSensor) -> SensorSpec {
    let mut unit = raw.unit.filter(|u| !u.is_empty());
    let state_class = raw.state_class;
    let mut options = None;

    let device_class = match raw.device_class {
        Some(class) if class == ENUM_DEVICE_CLASS => {
            let mut keep = true;
            if unit.is_some() {
                warn!(model_key, property = %name, "enum sensor has a unit, dropping device class");
                keep = false;
            }
            if state_class.is_some() {
                warn!(model_key, property = %name, "enum sensor has a state_class, dropping device class");
                keep = false;
            }
            match raw.options {
                Some(table) if keep => {
                    options = Some(table);
                    Some(class)
                }
                Some(_) => None,
                None => {
                    warn!(model_key, property = %name, "enum sensor has no options, dropping device class");
                    None
                }
            }
        }
        Some(class) if UNITLESS_DEVICE_CLASSES.contains(&class.as_str()) => {
            if let Some(u) = unit.take() {
                warn!(model_key, property = %name, device_class = %class, unit = %u,
                      "unitless device class with unit, dropping unit");
            }
            Some(class)
        }
        Some(class) => {
            if unit.is_none() {
                warn!(model_key, property = %name, device_class = %class,
                      "device class without unit, dropping device class");
                None
            } else {
                Some(class)
            }
        }
        None => None,
    };

    SensorSpec {
        unknown_value: raw.unknown_value,
        read_only: raw.read_only,
        multiplier: raw.multiplier,
        unit,
        state_class,
        device_class,
        options,
    }
}

fn build_number(model_key: &str, name: &str, raw: RawNumber) -> NumberSpec {
    let mut unit = raw.unit.filter(|u| !u.is_empty());

    let device_class = match raw.device_class {
        Some(class) if UNITLESS_DEVICE_CLASSES.contains(&class.as_str()) => {
            if let Some(u) = unit.take() {
                warn!(model_key, property = %name, device_class = %class, unit = %u,
                      "unitless device class with unit, dropping unit");
            }
            Some(class)
        }
        Some(class) => {
            if unit.is_none() {
                warn!(model_key, property = %name, device_class = %class,
                      "device class without unit, dropping device class");
                None
            } else {
                Some(class)
            }
        }
        None => None,
    };

    NumberSpec {
        min_value: raw.min_value,
        max_value: raw.max_value,
        unit,
        device_class,
    }
}

fn build_presets(model_key: &str, raw: Vec<HashMap<String, Value>>) -> Vec<Preset> {
    let mut presets = Vec::new();
    for mut entry in raw {
        let name = match entry.remove("preset").and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        }) {
            Some(name) => name,
            None => {
                warn!(model_key, "climate preset without a name, skipping");
                continue;
            }
        };

        let mut signature = HashMap::new();
        let mut valid = true;
        for (key, value) in entry {
            match value.as_i64() {
                Some(code) => {
                    signature.insert(key, code);
                }
                None => {
                    warn!(model_key, preset = %name, key = %key,
                          "non-integer preset value, skipping preset");
                    valid = false;
                    break;
                }
            }
        }
        if valid {
            presets.push(Preset { name, signature });
        }
    }
    presets
}

fn parse_target<T: serde::de::DeserializeOwned>(label: &str) -> Option<T> {
    serde_json::from_value(Value::String(label.to_string())).ok()
}

#[cfg(test)]
mod tests {
    use super::super::{parse_dictionary, Capability, ClimateTarget, EntityKind};

    #[test]
    fn minimal_property_defaults_to_plain_sensor() {
        let dictionary = parse_dictionary(
            "000-000",
            r#"{ "properties": [ { "property": "f_votality" } ] }"#,
        )
        .unwrap();
        let lookup = dictionary.lookup("f_votality");
        assert!(lookup.is_declared());
        assert_eq!(
            lookup.descriptor().capability.kind(),
            EntityKind::Sensor
        );
    }

    #[test]
    fn climate_target_parses_and_unknown_target_degrades() {
        let dictionary = parse_dictionary(
            "000-000",
            r#"{ "properties": [
                { "property": "t_power", "climate": { "target": "is_on" } },
                { "property": "t_odd", "climate": { "target": "warp_drive" } }
            ] }"#,
        )
        .unwrap();

        match &dictionary.lookup("t_power").descriptor().capability {
            Capability::Climate(spec) => assert_eq!(spec.target, Some(ClimateTarget::IsOn)),
            other => panic!("unexpected capability: {other:?}"),
        }
        match &dictionary.lookup("t_odd").descriptor().capability {
            Capability::Climate(spec) => assert_eq!(spec.target, None),
            other => panic!("unexpected capability: {other:?}"),
        }
    }

    #[test]
    fn enum_sensor_without_options_drops_device_class() {
        let dictionary = parse_dictionary(
            "000-000",
            r#"{ "properties": [
                { "property": "f_e_push", "sensor": { "device_class": "enum" } },
                { "property": "f_temp", "sensor": { "device_class": "temperature", "unit": "°C" } }
            ] }"#,
        )
        .unwrap();

        match &dictionary.lookup("f_e_push").descriptor().capability {
            Capability::Sensor(spec) => {
                assert_eq!(spec.device_class, None);
                assert_eq!(spec.options, None);
            }
            other => panic!("unexpected capability: {other:?}"),
        }
        // Sibling property is unaffected by the degraded one.
        match &dictionary.lookup("f_temp").descriptor().capability {
            Capability::Sensor(spec) => {
                assert_eq!(spec.device_class.as_deref(), Some("temperature"));
            }
            other => panic!("unexpected capability: {other:?}"),
        }
    }

    #[test]
    fn device_class_without_unit_is_dropped() {
        let dictionary = parse_dictionary(
            "000-000",
            r#"{ "properties": [
                { "property": "f_power", "sensor": { "device_class": "power" } }
            ] }"#,
        )
        .unwrap();
        match &dictionary.lookup("f_power").descriptor().capability {
            Capability::Sensor(spec) => assert_eq!(spec.device_class, None),
            other => panic!("unexpected capability: {other:?}"),
        }
    }

    #[test]
    fn presets_keep_schema_order() {
        let dictionary = parse_dictionary(
            "000-000",
            r#"{
                "climate": { "presets": [
                    { "preset": "eco", "t_work_mode": 1, "t_eco": 1 },
                    { "preset": "boost", "t_work_mode": 2 },
                    { "t_work_mode": 3 }
                ] },
                "properties": []
            }"#,
        )
        .unwrap();
        let names: Vec<_> = dictionary.presets().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["eco", "boost"]);
        assert_eq!(dictionary.presets()[0].signature.len(), 2);
    }

    #[test]
    fn option_tables_parse_integer_keys() {
        let dictionary = parse_dictionary(
            "000-000",
            r#"{ "properties": [
                { "property": "t_work_mode",
                  "climate": { "target": "hvac_mode", "options": { "1": "heat", "2": "cool" } } }
            ] }"#,
        )
        .unwrap();
        match &dictionary.lookup("t_work_mode").descriptor().capability {
            Capability::Climate(spec) => {
                assert_eq!(spec.options.get(&1).map(String::as_str), Some("heat"));
                assert_eq!(spec.options.get(&2).map(String::as_str), Some("cool"));
            }
            other => panic!("unexpected capability: {other:?}"),
        }
    }
}
