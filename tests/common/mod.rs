//! Shared fixtures: a scripted cloud client and appliance builders.

#![allow(dead_code)] // not every test target uses every fixture

use async_trait::async_trait;
use connectlife_bridge::client::{Appliance, ApplianceClient, StatusValue};
use connectlife_bridge::config::{BridgeConfig, CloudConfig, DeviceOptions, PollingConfig};
use connectlife_bridge::error::{BridgeError, Result};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// Cloud client whose poll responses are scripted ahead of time.
///
/// Every write is recorded; `fail_writes` makes subsequent writes fail so
/// tests can assert that optimistic patches are withheld.
#[derive(Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<Result<Vec<Appliance>>>>,
    pub writes: Mutex<Vec<(String, HashMap<String, String>)>>,
    pub fail_writes: Mutex<bool>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_snapshot(&self, appliances: Vec<Appliance>) {
        self.responses.lock().unwrap().push_back(Ok(appliances));
    }

    pub fn push_error(&self, error: BridgeError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_writes(&self) -> Vec<(String, HashMap<String, String>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApplianceClient for MockClient {
    async fn login(&self) -> Result<()> {
        Ok(())
    }

    async fn get_appliances(&self) -> Result<Vec<Appliance>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn update_appliance(
        &self,
        puid: &str,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(BridgeError::appliance_control("write rejected"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((puid.to_string(), properties));
        Ok(())
    }
}

pub fn appliance(device_id: &str, model: (&str, &str), status: &[(&str, i64)]) -> Appliance {
    Appliance {
        device_id: device_id.into(),
        puid: format!("puid-{device_id}"),
        device_type_code: model.0.into(),
        device_feature_code: model.1.into(),
        device_feature_name: String::new(),
        device_nick_name: format!("{device_id} nickname"),
        room_name: "Living room".into(),
        offline_state: 1,
        status_list: status
            .iter()
            .map(|(k, v)| (k.to_string(), StatusValue::Int(*v)))
            .collect(),
    }
}

pub fn offline(mut appliance: Appliance) -> Appliance {
    appliance.offline_state = 0;
    appliance
}

/// Configuration pointing at a test dictionary directory.
pub fn config(dictionary_dir: &Path) -> BridgeConfig {
    BridgeConfig {
        cloud: CloudConfig {
            username: "tester@example.com".into(),
            password: "secret".into(),
            base_url: url::Url::parse("http://localhost:9/").unwrap(),
            request_timeout_secs: 5,
        },
        bridge: PollingConfig {
            poll_interval_secs: 60,
            dictionary_dir: dictionary_dir.to_path_buf(),
        },
        devices: HashMap::new(),
    }
}

pub fn config_with_beep_disabled(dictionary_dir: &Path, device_id: &str) -> BridgeConfig {
    let mut config = config(dictionary_dir);
    config
        .devices
        .insert(device_id.to_string(), DeviceOptions { disable_beep: true });
    config
}

/// Air-conditioner schema used across the integration tests.
pub const AC_SCHEMA: &str = r#"{
    "climate": { "presets": [
        { "preset": "eco", "t_work_mode": 2, "t_eco": 1 }
    ] },
    "properties": [
        { "property": "t_power", "climate": { "target": "is_on" } },
        { "property": "t_work_mode",
          "climate": { "target": "hvac_mode",
                       "options": { "1": "heat", "2": "cool" } } },
        { "property": "t_temp",
          "climate": { "target": "target_temperature",
                       "min_value": { "°C": 16.0 }, "max_value": { "°C": 32.0 } } },
        { "property": "f_temp_in",
          "sensor": { "unit": "°C", "device_class": "temperature" } },
        { "property": "t_beep", "switch": {} },
        { "property": "t_volume", "number": { "min_value": 0.0, "max_value": 10.0 } },
        { "property": "f_serial", "sensor": { "read_only": true } }
    ]
}"#;

/// Write a dictionary file for one model key into a directory.
pub fn write_schema(dir: &Path, model_key: &str, schema: &str) {
    std::fs::write(dir.join(format!("{model_key}.json")), schema).unwrap();
}
