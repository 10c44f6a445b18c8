//! Dictionary resolution: per-model-key schemas describing how raw status
//! keys map to typed capabilities.
//!
//! A [`Dictionary`] is resolved at most once per model key by the
//! [`DictionaryStore`] and is immutable afterwards. Every raw key always
//! resolves to *some* descriptor: keys the schema does not declare fall back
//! to a hidden, disabled default sensor so callers never fail on lookup.

mod parse;

use crate::client::StatusValue;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Raw code → symbolic label table for enumerated targets.
pub type OptionTable = BTreeMap<i64, String>;

/// Numeric bound that is either flat or keyed by temperature unit label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericBound {
    Scalar(f64),
    PerUnit(BTreeMap<String, f64>),
}

/// Semantic slot a climate-capability raw key fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateTarget {
    IsOn,
    HvacMode,
    HvacAction,
    FanMode,
    SwingMode,
    TargetHumidity,
    TargetTemperature,
    TemperatureUnit,
}

impl ClimateTarget {
    /// Targets whose values go through an option table.
    pub fn is_enumerated(self) -> bool {
        matches!(
            self,
            ClimateTarget::HvacMode
                | ClimateTarget::HvacAction
                | ClimateTarget::FanMode
                | ClimateTarget::SwingMode
                | ClimateTarget::TemperatureUnit
        )
    }
}

/// Semantic slot a humidifier-capability raw key fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumidifierTarget {
    IsOn,
    Mode,
    Action,
    TargetHumidity,
}

impl HumidifierTarget {
    pub fn is_enumerated(self) -> bool {
        matches!(self, HumidifierTarget::Mode | HumidifierTarget::Action)
    }
}

/// Semantic slot a water-heater-capability raw key fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterHeaterTarget {
    IsOn,
    State,
    CurrentOperation,
    IsAwayModeOn,
    TargetTemperature,
    TemperatureUnit,
}

impl WaterHeaterTarget {
    pub fn is_enumerated(self) -> bool {
        matches!(
            self,
            WaterHeaterTarget::State
                | WaterHeaterTarget::CurrentOperation
                | WaterHeaterTarget::IsAwayModeOn
                | WaterHeaterTarget::TemperatureUnit
        )
    }
}

/// Binary sensor capability: raw code → boolean.
#[derive(Debug, Clone, PartialEq)]
pub struct BinarySensorSpec {
    pub device_class: Option<String>,
    pub options: BTreeMap<i64, bool>,
}

impl Default for BinarySensorSpec {
    fn default() -> Self {
        // Cloud convention: 0 and 1 both read as "off", 2 as "on".
        let mut options = BTreeMap::new();
        options.insert(0, false);
        options.insert(1, false);
        options.insert(2, true);
        Self {
            device_class: None,
            options,
        }
    }
}

/// Plain or enumerated sensor capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSpec {
    pub unknown_value: Option<i64>,
    pub read_only: Option<bool>,
    pub multiplier: Option<f64>,
    /// Literal unit, or `property.<name>` to resolve through another key.
    pub unit: Option<String>,
    pub state_class: Option<String>,
    pub device_class: Option<String>,
    /// Present only for the `enum` device class.
    pub options: Option<OptionTable>,
}

/// Switch capability; the write path may use a distinct command key/value.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchSpec {
    pub device_class: Option<String>,
    pub off: i64,
    pub on: i64,
    /// Raw key to write when it differs from the status key.
    pub command_name: Option<String>,
    /// Subtracted from on/off to obtain the written command value.
    pub command_adjust: i64,
}

impl Default for SwitchSpec {
    fn default() -> Self {
        Self {
            device_class: None,
            off: 0,
            on: 1,
            command_name: None,
            command_adjust: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectSpec {
    pub options: OptionTable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberSpec {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub unit: Option<String>,
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateSpec {
    pub target: Option<ClimateTarget>,
    pub options: OptionTable,
    pub unknown_value: Option<i64>,
    pub min_value: Option<NumericBound>,
    pub max_value: Option<NumericBound>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HumidifierSpec {
    pub target: Option<HumidifierTarget>,
    pub options: OptionTable,
    pub device_class: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterHeaterSpec {
    pub target: Option<WaterHeaterTarget>,
    pub options: OptionTable,
    pub unknown_value: Option<i64>,
    pub min_value: Option<NumericBound>,
    pub max_value: Option<NumericBound>,
}

/// Exactly one capability per declared property.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    BinarySensor(BinarySensorSpec),
    Climate(ClimateSpec),
    Humidifier(HumidifierSpec),
    Number(NumberSpec),
    Sensor(SensorSpec),
    Select(SelectSpec),
    Switch(SwitchSpec),
    WaterHeater(WaterHeaterSpec),
}

/// Entity kind a capability projects to; used by the registry reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    BinarySensor,
    Climate,
    Humidifier,
    Number,
    Sensor,
    Select,
    Switch,
    WaterHeater,
}

impl Capability {
    pub fn kind(&self) -> EntityKind {
        match self {
            Capability::BinarySensor(_) => EntityKind::BinarySensor,
            Capability::Climate(_) => EntityKind::Climate,
            Capability::Humidifier(_) => EntityKind::Humidifier,
            Capability::Number(_) => EntityKind::Number,
            Capability::Sensor(_) => EntityKind::Sensor,
            Capability::Select(_) => EntityKind::Select,
            Capability::Switch(_) => EntityKind::Switch,
            Capability::WaterHeater(_) => EntityKind::WaterHeater,
        }
    }
}

/// Typed description of how one raw status key is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub icon: Option<String>,
    pub hide: bool,
    pub disable: bool,
    /// Raw value meaning "this key is not live on this appliance model".
    pub unavailable: Option<i64>,
    pub capability: Capability,
}

impl PropertyDescriptor {
    /// Hidden, disabled default sensor used for undeclared raw keys.
    pub fn hidden_default() -> Self {
        Self {
            name: "default".to_string(),
            icon: None,
            hide: true,
            disable: true,
            unavailable: None,
            capability: Capability::Sensor(SensorSpec::default()),
        }
    }

    /// Whether the current raw value keeps this property live.
    pub fn is_available_for(&self, value: Option<&StatusValue>) -> bool {
        match (self.unavailable, value) {
            (Some(sentinel), Some(v)) => v.as_code() != Some(sentinel),
            _ => true,
        }
    }
}

/// Named partial raw-value signature identifying an operating profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub signature: HashMap<String, i64>,
}

impl Preset {
    /// The preset is active while its full signature is a subset of the
    /// status map.
    pub fn matches(&self, status: &HashMap<String, StatusValue>) -> bool {
        self.signature
            .iter()
            .all(|(key, code)| status.get(key).and_then(StatusValue::as_code) == Some(*code))
    }
}

/// Descriptor lookup result carrying declared-vs-defaulted provenance.
#[derive(Debug, Clone, Copy)]
pub enum PropertyLookup<'a> {
    Declared(&'a PropertyDescriptor),
    Defaulted(&'a PropertyDescriptor),
}

impl<'a> PropertyLookup<'a> {
    pub fn descriptor(&self) -> &'a PropertyDescriptor {
        match self {
            PropertyLookup::Declared(d) | PropertyLookup::Defaulted(d) => d,
        }
    }

    pub fn is_declared(&self) -> bool {
        matches!(self, PropertyLookup::Declared(_))
    }
}

/// Resolved, immutable schema for one model key.
#[derive(Debug)]
pub struct Dictionary {
    properties: HashMap<String, PropertyDescriptor>,
    presets: Vec<Preset>,
    default: PropertyDescriptor,
}

impl Dictionary {
    pub fn new(properties: HashMap<String, PropertyDescriptor>, presets: Vec<Preset>) -> Self {
        Self {
            properties,
            presets,
            default: PropertyDescriptor::hidden_default(),
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new(), Vec::new())
    }

    /// Descriptor for a raw key, falling back to the hidden default.
    pub fn lookup(&self, key: &str) -> PropertyLookup<'_> {
        match self.properties.get(key) {
            Some(descriptor) => PropertyLookup::Declared(descriptor),
            None => PropertyLookup::Defaulted(&self.default),
        }
    }

    /// Declared descriptors in no particular order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    /// Presets in schema declaration order.
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn has_kind(&self, kind: EntityKind) -> bool {
        self.properties.values().any(|p| p.capability.kind() == kind)
    }
}

/// Process-lifetime dictionary cache, explicitly constructed and owned by
/// the coordinator. Resolution never fails: a missing or unparsable schema
/// file yields an empty dictionary whose lookups all default.
pub struct DictionaryStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Dictionary>>>,
}

impl DictionaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the dictionary for a model key, loading it on first use.
    pub fn resolve(&self, model_key: &str) -> Arc<Dictionary> {
        if let Some(dictionary) = self.cache.read().expect("cache poisoned").get(model_key) {
            return Arc::clone(dictionary);
        }

        let dictionary = Arc::new(self.load(model_key));
        let mut cache = self.cache.write().expect("cache poisoned");
        // A racing resolver may have inserted first; keep the existing entry
        // so all holders share one instance.
        Arc::clone(
            cache
                .entry(model_key.to_string())
                .or_insert(dictionary),
        )
    }

    fn load(&self, model_key: &str) -> Dictionary {
        let path = self.dir.join(format!("{model_key}.json"));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(model_key, "no dictionary for model key, all properties will default");
                return Dictionary::empty();
            }
            Err(e) => {
                warn!(model_key, error = %e, "cannot read dictionary file");
                return Dictionary::empty();
            }
        };

        match parse::parse_dictionary(model_key, &raw) {
            Ok(dictionary) => dictionary,
            Err(e) => {
                warn!(model_key, error = %e, "dictionary file is not valid JSON");
                Dictionary::empty()
            }
        }
    }
}

/// Parse a dictionary document from a JSON string (exposed for tests and
/// schema tooling).
pub fn parse_dictionary(model_key: &str, raw: &str) -> Result<Dictionary> {
    parse::parse_dictionary(model_key, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_keys_default_to_a_hidden_disabled_sensor() {
        let dictionary = Dictionary::empty();
        let lookup = dictionary.lookup("f_mystery");
        assert!(!lookup.is_declared());

        let descriptor = lookup.descriptor();
        assert!(descriptor.hide);
        assert!(descriptor.disable);
        assert_eq!(descriptor.capability.kind(), EntityKind::Sensor);
    }
}
