//! State projection: raw status maps → typed entity states.
//!
//! Projectors are pure and synchronous. They never touch the network and
//! never fail: a raw value that cannot be interpreted degrades the affected
//! field and leaves the rest of the state intact.

pub mod climate;
pub mod humidifier;
pub mod simple;
pub mod water_heater;

pub use climate::{ClimateEntity, ClimateState};
pub use humidifier::{HumidifierEntity, HumidifierState};
pub use simple::{project_binary_sensor, project_number, project_select, project_switch,
                 project_sensor, resolve_unit, SensorReading};
pub use water_heater::{WaterHeaterEntity, WaterHeaterState};

use crate::dictionary::{NumericBound, OptionTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Outcome of projecting one enumerated field.
///
/// `Unset` means the backing raw key is absent or cleared by an unknown-value
/// sentinel; `Unmapped` means a value was present but had no table entry.
/// Consumers render both as "unknown" but the distinction matters for
/// logging and tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projected<T> {
    #[default]
    Unset,
    Unmapped,
    Value(T),
}

impl<T> Projected<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Projected::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Projected::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Projected::Unset)
    }
}

/// Temperature unit, normalized from the many spellings schemas use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Accepts `°C`, `C`, `celsius`, `Celsius` and the Fahrenheit analogues.
    pub fn normalize(label: &str) -> Option<Self> {
        match label.trim() {
            "°C" | "C" | "celsius" | "Celsius" => Some(TemperatureUnit::Celsius),
            "°F" | "F" | "fahrenheit" | "Fahrenheit" => Some(TemperatureUnit::Fahrenheit),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Closed HVAC mode vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "off" => Some(HvacMode::Off),
            "heat" => Some(HvacMode::Heat),
            "cool" => Some(HvacMode::Cool),
            "heat_cool" => Some(HvacMode::HeatCool),
            "auto" => Some(HvacMode::Auto),
            "dry" => Some(HvacMode::Dry),
            "fan_only" => Some(HvacMode::FanOnly),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Auto => "auto",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed HVAC action vocabulary (what the unit is doing right now).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Off,
    Preheating,
    Heating,
    Cooling,
    Drying,
    Fan,
    Idle,
    Defrosting,
}

impl HvacAction {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "off" => Some(HvacAction::Off),
            "preheating" => Some(HvacAction::Preheating),
            "heating" => Some(HvacAction::Heating),
            "cooling" => Some(HvacAction::Cooling),
            "drying" => Some(HvacAction::Drying),
            "fan" => Some(HvacAction::Fan),
            "idle" => Some(HvacAction::Idle),
            "defrosting" => Some(HvacAction::Defrosting),
            _ => None,
        }
    }
}

/// Closed humidifier action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumidifierAction {
    Humidifying,
    Drying,
    Idle,
    Off,
}

impl HumidifierAction {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "humidifying" => Some(HumidifierAction::Humidifying),
            "drying" => Some(HumidifierAction::Drying),
            "idle" => Some(HumidifierAction::Idle),
            "off" => Some(HumidifierAction::Off),
            _ => None,
        }
    }
}

/// Build the label → raw-code reverse of an option table.
///
/// Tables are iterated in ascending code order; a duplicated label keeps the
/// highest code (last write wins) and is reported once at entity build time.
pub(crate) fn reverse_table(context: &str, table: &OptionTable) -> HashMap<String, i64> {
    let mut reverse = HashMap::with_capacity(table.len());
    for (code, label) in table {
        if let Some(previous) = reverse.insert(label.clone(), *code) {
            warn!(context, label = %label, previous, kept = code,
                  "duplicate option label, keeping the higher code");
        }
    }
    reverse
}

/// Normalize a per-unit bound into a map keyed by [`TemperatureUnit`].
///
/// Scalar bounds do not apply to temperature targets and yield an empty map;
/// unit labels that do not normalize are dropped with a warning.
pub(crate) fn temperature_bound_map(
    context: &str,
    bound: Option<&NumericBound>,
) -> HashMap<TemperatureUnit, f64> {
    let mut map = HashMap::new();
    if let Some(NumericBound::PerUnit(entries)) = bound {
        for (label, value) in entries {
            match TemperatureUnit::normalize(label) {
                Some(unit) => {
                    map.insert(unit, *value);
                }
                None => {
                    warn!(context, unit = %label, "unrecognized temperature unit in bound");
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_unit_normalization() {
        assert_eq!(TemperatureUnit::normalize("°C"), Some(TemperatureUnit::Celsius));
        assert_eq!(TemperatureUnit::normalize("Celsius"), Some(TemperatureUnit::Celsius));
        assert_eq!(TemperatureUnit::normalize("F"), Some(TemperatureUnit::Fahrenheit));
        assert_eq!(TemperatureUnit::normalize("kelvin"), None);
    }

    #[test]
    fn reverse_table_last_write_wins() {
        let mut table = OptionTable::new();
        table.insert(1, "eco".to_string());
        table.insert(2, "boost".to_string());
        table.insert(3, "eco".to_string());
        let reverse = reverse_table("test", &table);
        assert_eq!(reverse.get("eco"), Some(&3));
        assert_eq!(reverse.get("boost"), Some(&2));
    }

    #[test]
    fn scalar_bound_yields_no_temperature_map() {
        let map = temperature_bound_map("test", Some(&NumericBound::Scalar(16.0)));
        assert!(map.is_empty());

        let mut per_unit = std::collections::BTreeMap::new();
        per_unit.insert("°C".to_string(), 16.0);
        per_unit.insert("°F".to_string(), 61.0);
        let map = temperature_bound_map("test", Some(&NumericBound::PerUnit(per_unit)));
        assert_eq!(map.get(&TemperatureUnit::Celsius), Some(&16.0));
        assert_eq!(map.get(&TemperatureUnit::Fahrenheit), Some(&61.0));
    }

    #[test]
    fn hvac_mode_labels_round_trip() {
        for mode in [
            HvacMode::Off,
            HvacMode::Heat,
            HvacMode::Cool,
            HvacMode::HeatCool,
            HvacMode::Auto,
            HvacMode::Dry,
            HvacMode::FanOnly,
        ] {
            assert_eq!(HvacMode::from_label(mode.label()), Some(mode));
        }
    }
}
