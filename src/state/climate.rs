//! Climate entity: schema binding and state projection.
//!
//! A [`ClimateEntity`] is built once per appliance from its dictionary and
//! holds the forward and reverse option tables for every declared climate
//! target. [`ClimateEntity::project`] turns one raw status map into a
//! [`ClimateState`], carrying over fields from the previous state where the
//! backing raw key is absent.

use super::{
    reverse_table, temperature_bound_map, HvacAction, HvacMode, Projected, TemperatureUnit,
};
use crate::client::Appliance;
use crate::dictionary::{Capability, ClimateTarget, Dictionary, Preset};
use std::collections::HashMap;
use tracing::warn;

/// Projected climate state for one appliance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateState {
    pub available: bool,
    /// Power flag; defaults to on when no power target is declared.
    pub is_on: bool,
    pub hvac_mode: Projected<HvacMode>,
    pub hvac_action: Projected<HvacAction>,
    pub fan_mode: Projected<String>,
    pub swing_mode: Projected<String>,
    pub preset: Option<String>,
    pub target_temperature: Option<f64>,
    pub target_humidity: Option<f64>,
    pub temperature_unit: TemperatureUnit,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
}

impl Default for ClimateState {
    fn default() -> Self {
        Self {
            available: true,
            is_on: true,
            hvac_mode: Projected::Unset,
            hvac_action: Projected::Unset,
            fan_mode: Projected::Unset,
            swing_mode: Projected::Unset,
            preset: None,
            target_temperature: None,
            target_humidity: None,
            temperature_unit: TemperatureUnit::Celsius,
            min_temperature: None,
            max_temperature: None,
        }
    }
}

impl ClimateState {
    /// The mode a consumer should display: `off` wins over the mode key.
    pub fn effective_hvac_mode(&self) -> Projected<HvacMode> {
        if !self.is_on {
            Projected::Value(HvacMode::Off)
        } else {
            self.hvac_mode.clone()
        }
    }

    /// Pin a just-commanded preset ahead of the next projection.
    ///
    /// Without the pin, a previously-active preset whose signature overlaps
    /// the commanded one would stay selected by the stay rule in
    /// [`ClimateEntity::project`].
    pub fn apply_preset_hint(&mut self, hint: Option<&str>) {
        if let Some(name) = hint {
            self.preset = Some(name.to_string());
        }
    }
}

/// Per-target raw-key binding for one climate-capable model.
#[derive(Debug)]
pub struct ClimateEntity {
    target_keys: HashMap<ClimateTarget, String>,
    /// Unknown-value sentinel per raw key.
    unknown_values: HashMap<String, i64>,
    hvac_mode_table: HashMap<i64, HvacMode>,
    hvac_mode_reverse: HashMap<HvacMode, i64>,
    hvac_action_table: HashMap<i64, HvacAction>,
    fan_mode_table: HashMap<i64, String>,
    fan_mode_reverse: HashMap<String, i64>,
    swing_mode_table: HashMap<i64, String>,
    swing_mode_reverse: HashMap<String, i64>,
    temperature_unit_table: HashMap<i64, TemperatureUnit>,
    min_temperature: HashMap<TemperatureUnit, f64>,
    max_temperature: HashMap<TemperatureUnit, f64>,
    min_humidity: Option<f64>,
    max_humidity: Option<f64>,
    presets: Vec<Preset>,
}

impl ClimateEntity {
    /// Bind the climate capability of a dictionary, or `None` when the model
    /// declares no climate properties.
    pub fn from_dictionary(model_key: &str, dictionary: &Dictionary) -> Option<Self> {
        let mut entity = ClimateEntity {
            target_keys: HashMap::new(),
            unknown_values: HashMap::new(),
            hvac_mode_table: HashMap::new(),
            hvac_mode_reverse: HashMap::new(),
            hvac_action_table: HashMap::new(),
            fan_mode_table: HashMap::new(),
            fan_mode_reverse: HashMap::new(),
            swing_mode_table: HashMap::new(),
            swing_mode_reverse: HashMap::new(),
            temperature_unit_table: HashMap::new(),
            min_temperature: HashMap::new(),
            max_temperature: HashMap::new(),
            min_humidity: None,
            max_humidity: None,
            presets: dictionary.presets().to_vec(),
        };

        let mut bound_any = false;
        for descriptor in dictionary.properties() {
            let Capability::Climate(spec) = &descriptor.capability else {
                continue;
            };
            bound_any = true;
            let Some(target) = spec.target else { continue };

            if let Some(previous) = entity
                .target_keys
                .insert(target, descriptor.name.clone())
            {
                warn!(model_key, ?target, previous = %previous, kept = %descriptor.name,
                      "duplicate climate target");
            }
            if let Some(sentinel) = spec.unknown_value {
                entity.unknown_values.insert(descriptor.name.clone(), sentinel);
            }

            let context = format!("{model_key}:{}", descriptor.name);
            match target {
                ClimateTarget::HvacMode => {
                    for (code, label) in &spec.options {
                        match HvacMode::from_label(label) {
                            Some(mode) => {
                                entity.hvac_mode_table.insert(*code, mode);
                                entity.hvac_mode_reverse.insert(mode, *code);
                            }
                            None => {
                                warn!(model_key, property = %descriptor.name, label = %label,
                                      "unrecognized hvac mode label");
                            }
                        }
                    }
                }
                ClimateTarget::HvacAction => {
                    for (code, label) in &spec.options {
                        match HvacAction::from_label(label) {
                            Some(action) => {
                                entity.hvac_action_table.insert(*code, action);
                            }
                            None => {
                                warn!(model_key, property = %descriptor.name, label = %label,
                                      "unrecognized hvac action label");
                            }
                        }
                    }
                }
                ClimateTarget::FanMode => {
                    entity.fan_mode_table =
                        spec.options.iter().map(|(c, l)| (*c, l.clone())).collect();
                    entity.fan_mode_reverse = reverse_table(&context, &spec.options);
                }
                ClimateTarget::SwingMode => {
                    entity.swing_mode_table =
                        spec.options.iter().map(|(c, l)| (*c, l.clone())).collect();
                    entity.swing_mode_reverse = reverse_table(&context, &spec.options);
                }
                ClimateTarget::TemperatureUnit => {
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
                ClimateTarget::TargetTemperature => {
                    entity.min_temperature =
                        temperature_bound_map(&context, spec.min_value.as_ref());
                    entity.max_temperature =
                        temperature_bound_map(&context, spec.max_value.as_ref());
                }
                ClimateTarget::TargetHumidity => {
                    entity.min_humidity = spec.min_value.as_ref().and_then(scalar);
                    entity.max_humidity = spec.max_value.as_ref().and_then(scalar);
                }
                ClimateTarget::IsOn => {}
            }
        }

        bound_any.then_some(entity)
    }

    pub fn key(&self, target: ClimateTarget) -> Option<&str> {
        self.target_keys.get(&target).map(String::as_str)
    }

    /// Advertised mode list, `off` first when a power target exists.
    pub fn hvac_modes(&self) -> Vec<HvacMode> {
        let mut modes = Vec::new();
        if self.target_keys.contains_key(&ClimateTarget::IsOn) {
            modes.push(HvacMode::Off);
        }
        let mut declared: Vec<_> = self.hvac_mode_table.values().copied().collect();
        declared.sort_by_key(|m| m.label());
        for mode in declared {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        if modes.is_empty() {
            modes.push(HvacMode::Auto);
        }
        modes
    }

    pub fn fan_modes(&self) -> Vec<&str> {
        self.fan_mode_table.values().map(String::as_str).collect()
    }

    pub fn swing_modes(&self) -> Vec<&str> {
        self.swing_mode_table.values().map(String::as_str).collect()
    }

    pub fn preset_modes(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn min_humidity(&self) -> Option<f64> {
        self.min_humidity
    }

    pub fn max_humidity(&self) -> Option<f64> {
        self.max_humidity
    }

    pub(crate) fn hvac_mode_code(&self, mode: HvacMode) -> Option<i64> {
        self.hvac_mode_reverse.get(&mode).copied()
    }

    pub(crate) fn fan_mode_code(&self, label: &str) -> Option<i64> {
        self.fan_mode_reverse.get(label).copied()
    }

    pub(crate) fn swing_mode_code(&self, label: &str) -> Option<i64> {
        self.swing_mode_reverse.get(label).copied()
    }

    /// Raw code for one key, with the unknown-value sentinel mapped to `None`.
    fn code(&self, appliance: &Appliance, target: ClimateTarget) -> Option<i64> {
        let key = self.target_keys.get(&target)?;
        let code = appliance.status_list.get(key)?.as_code()?;
        if self.unknown_values.get(key) == Some(&code) {
            return None;
        }
        Some(code)
    }

    fn number(&self, appliance: &Appliance, target: ClimateTarget) -> Option<f64> {
        let key = self.target_keys.get(&target)?;
        let value = appliance.status_list.get(key)?;
        if let Some(code) = value.as_code() {
            if self.unknown_values.get(key) == Some(&code) {
                return None;
            }
        }
        value.as_number()
    }

    /// Project one appliance snapshot into a climate state.
    ///
    /// Fields whose backing raw key is absent keep their value from
    /// `previous`; an unknown-value sentinel clears the field instead.
    pub fn project(&self, appliance: &Appliance, previous: Option<&ClimateState>) -> ClimateState {
        let mut state = previous.cloned().unwrap_or_default();
        let status = &appliance.status_list;

        // Power and mode re-derive every cycle; everything else is sticky.
        // Auto is assumed even for models with no mode key at all.
        state.is_on = true;
        state.hvac_mode = Projected::Value(HvacMode::Auto);

        if let Some(key) = self.target_keys.get(&ClimateTarget::IsOn) {
            if let Some(code) = status.get(key).and_then(|v| v.as_code()) {
                state.is_on = code != 0;
            }
        }

        if let Some(code) = self.code(appliance, ClimateTarget::HvacMode) {
            state.hvac_mode = match self.hvac_mode_table.get(&code) {
                Some(mode) => Projected::Value(*mode),
                // Closed vocabulary: unmapped codes stay silent, the table
                // anomaly was already reported at bind time.
                None => Projected::Unmapped,
            };
        }

        // Absent keys keep the previous value; the unknown-value sentinel
        // clears the field instead.
        if let Some(key) = self.target_keys.get(&ClimateTarget::HvacAction) {
            if status.contains_key(key) {
                state.hvac_action = match self.code(appliance, ClimateTarget::HvacAction) {
                    None => Projected::Unset,
                    Some(code) => match self.hvac_action_table.get(&code) {
                        Some(action) => Projected::Value(*action),
                        None => Projected::Unmapped,
                    },
                };
            }
        }

        if let Some(key) = self.target_keys.get(&ClimateTarget::FanMode) {
            if status.contains_key(key) {
                state.fan_mode = match self.code(appliance, ClimateTarget::FanMode) {
                    Some(code) => match self.fan_mode_table.get(&code) {
                        Some(label) => Projected::Value(label.clone()),
                        None => {
                            warn!(device = %appliance.device_id, property = %key, code,
                                  "raw fan mode has no option entry");
                            Projected::Unmapped
                        }
                    },
                    None => Projected::Unset,
                };
            }
        }

        if let Some(key) = self.target_keys.get(&ClimateTarget::SwingMode) {
            if status.contains_key(key) {
                state.swing_mode = match self.code(appliance, ClimateTarget::SwingMode) {
                    Some(code) => match self.swing_mode_table.get(&code) {
                        Some(label) => Projected::Value(label.clone()),
                        None => {
                            warn!(device = %appliance.device_id, property = %key, code,
                                  "raw swing mode has no option entry");
                            Projected::Unmapped
                        }
                    },
                    None => Projected::Unset,
                };
            }
        }

        if let Some(key) = self.target_keys.get(&ClimateTarget::TemperatureUnit) {
            if let Some(code) = self.code(appliance, ClimateTarget::TemperatureUnit) {
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

        if let Some(key) = self.target_keys.get(&ClimateTarget::TargetTemperature) {
            if status.contains_key(key) {
                state.target_temperature = self.number(appliance, ClimateTarget::TargetTemperature);
            }
        }
        if let Some(key) = self.target_keys.get(&ClimateTarget::TargetHumidity) {
            if status.contains_key(key) {
                state.target_humidity = self.number(appliance, ClimateTarget::TargetHumidity);
            }
        }

        state.preset = self.project_preset(status, state.preset.take());
        state.available = appliance.is_online();
        state
    }

    /// A preset stays active while its signature still matches; otherwise
    /// the first matching preset in schema order wins.
    fn project_preset(
        &self,
        status: &HashMap<String, crate::client::StatusValue>,
        previous: Option<String>,
    ) -> Option<String> {
        if self.presets.is_empty() {
            return None;
        }
        if let Some(name) = &previous {
            if self
                .presets
                .iter()
                .any(|p| &p.name == name && p.matches(status))
            {
                return previous;
            }
        }
        self.presets
            .iter()
            .find(|p| p.matches(status))
            .map(|p| p.name.clone())
    }
}

fn scalar(bound: &crate::dictionary::NumericBound) -> Option<f64> {
    match bound {
        crate::dictionary::NumericBound::Scalar(v) => Some(*v),
        crate::dictionary::NumericBound::PerUnit(_) => None,
    }
}
