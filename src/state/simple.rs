//! Projections for single-key entities: sensors, binary sensors, switches,
//! selects and numbers.

use crate::client::{max_datetime, StatusValue};
use crate::dictionary::{
    BinarySensorSpec, Capability, ClimateTarget, Dictionary, SelectSpec, SensorSpec, SwitchSpec,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

/// A projected sensor value. `None` from [`project_sensor`] means unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Numeric(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Label from an enum sensor's option table.
    Label(String),
}

/// Project a raw value through a sensor descriptor.
pub fn project_sensor(
    device_id: &str,
    key: &str,
    spec: &SensorSpec,
    value: Option<&StatusValue>,
) -> Option<SensorReading> {
    let value = value?;

    if let Some(options) = &spec.options {
        let code = value.as_code()?;
        return match options.get(&code) {
            Some(label) => Some(SensorReading::Label(label.clone())),
            None => {
                warn!(device = device_id, property = key, code,
                      "enum sensor value has no option entry");
                None
            }
        };
    }

    if let Some(sentinel) = spec.unknown_value {
        if value.as_code() == Some(sentinel) {
            return None;
        }
    }

    match value {
        StatusValue::Timestamp(t) => {
            // The cloud reports a far-future sentinel for "never".
            if *t == max_datetime() {
                None
            } else {
                Some(SensorReading::Timestamp(*t))
            }
        }
        StatusValue::Str(s) => Some(SensorReading::Text(s.clone())),
        _ => {
            let number = value.as_number()?;
            let scaled = match spec.multiplier {
                Some(multiplier) => number * multiplier,
                None => number,
            };
            Some(SensorReading::Numeric(scaled))
        }
    }
}

/// Resolve a sensor's unit, following one level of `property.<name>`
/// indirection through the dictionary.
///
/// The referenced key's current raw value selects a label from that key's
/// option table; temperature spellings normalize to their symbol.
pub fn resolve_unit(
    unit: Option<&str>,
    dictionary: &Dictionary,
    status: &HashMap<String, StatusValue>,
) -> Option<String> {
    let unit = unit?;
    let Some(referenced) = unit.strip_prefix("property.") else {
        return Some(normalize_unit_label(unit));
    };

    let descriptor = match dictionary.lookup(referenced) {
        lookup if lookup.is_declared() => lookup.descriptor().clone(),
        _ => {
            warn!(unit, "unit references an undeclared property");
            return None;
        }
    };

    let table = match &descriptor.capability {
        Capability::Climate(spec) if spec.target == Some(ClimateTarget::TemperatureUnit) => {
            &spec.options
        }
        Capability::Sensor(spec) => spec.options.as_ref()?,
        Capability::Select(spec) => &spec.options,
        other => {
            warn!(unit, kind = ?other.kind(), "unit references a property without options");
            return None;
        }
    };

    let code = status.get(referenced)?.as_code()?;
    table
        .get(&code)
        .map(|label| normalize_unit_label(label))
}

fn normalize_unit_label(label: &str) -> String {
    match super::TemperatureUnit::normalize(label) {
        Some(unit) => unit.symbol().to_string(),
        None => label.to_string(),
    }
}

/// Project a raw value through a binary sensor's option table.
pub fn project_binary_sensor(
    device_id: &str,
    key: &str,
    spec: &BinarySensorSpec,
    value: Option<&StatusValue>,
) -> Option<bool> {
    let code = value?.as_code()?;
    match spec.options.get(&code) {
        Some(flag) => Some(*flag),
        None => {
            warn!(device = device_id, property = key, code,
                  "binary sensor value has no option entry");
            None
        }
    }
}

/// Project a raw value to a switch position.
pub fn project_switch(
    device_id: &str,
    key: &str,
    spec: &SwitchSpec,
    value: Option<&StatusValue>,
) -> Option<bool> {
    let code = value?.as_code()?;
    if code == spec.on {
        Some(true)
    } else if code == spec.off {
        Some(false)
    } else {
        warn!(device = device_id, property = key, code,
              "switch value matches neither on nor off");
        None
    }
}

/// Project a raw value to a select option label.
pub fn project_select(
    device_id: &str,
    key: &str,
    spec: &SelectSpec,
    value: Option<&StatusValue>,
) -> Option<String> {
    let code = value?.as_code()?;
    match spec.options.get(&code) {
        Some(label) => Some(label.clone()),
        None => {
            warn!(device = device_id, property = key, code,
                  "select value has no option entry");
            None
        }
    }
}

/// Project a raw value to a number reading.
pub fn project_number(value: Option<&StatusValue>) -> Option<f64> {
    value?.as_number()
}
