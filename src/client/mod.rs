//! ConnectLife cloud client: appliance data model and transport trait

pub mod http_client;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sentinel timestamp the cloud reports for "never"/unknown datetime values.
pub fn max_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .expect("static timestamp")
}

/// A single raw status value as reported by the cloud.
///
/// The cloud serializes everything as JSON scalars; integers dominate, but
/// some properties are free-form strings or RFC 3339 timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusValue {
    Int(i64),
    Decimal(f64),
    Timestamp(DateTime<Utc>),
    Str(String),
}

impl StatusValue {
    /// The value as an option-table code, if it is integral.
    pub fn as_code(&self) -> Option<i64> {
        match self {
            StatusValue::Int(i) => Some(*i),
            StatusValue::Decimal(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    /// The value as a number, if numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StatusValue::Int(i) => Some(*i as f64),
            StatusValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            StatusValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusValue::Int(i) => write!(f, "{i}"),
            StatusValue::Decimal(d) => write!(f, "{d}"),
            StatusValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            StatusValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for StatusValue {
    fn from(v: i64) -> Self {
        StatusValue::Int(v)
    }
}

impl<'de> Deserialize<'de> for StatusValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(StatusValue::Int(i))
                } else if let Some(d) = n.as_f64() {
                    Ok(StatusValue::Decimal(d))
                } else {
                    Err(de::Error::custom("unrepresentable number"))
                }
            }
            serde_json::Value::String(s) => {
                if let Ok(ts) = DateTime::parse_from_rfc3339(&s) {
                    Ok(StatusValue::Timestamp(ts.with_timezone(&Utc)))
                } else {
                    Ok(StatusValue::Str(s))
                }
            }
            serde_json::Value::Bool(b) => Ok(StatusValue::Int(b as i64)),
            other => Err(de::Error::custom(format!(
                "unsupported status value: {other}"
            ))),
        }
    }
}

/// A ConnectLife appliance as reported by one poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appliance {
    /// Stable device identifier
    pub device_id: String,
    /// Identifier used on the write path
    pub puid: String,
    /// Device type code (first half of the model key)
    pub device_type_code: String,
    /// Feature code (second half of the model key)
    pub device_feature_code: String,
    /// Human-readable model name
    #[serde(default)]
    pub device_feature_name: String,
    /// User-assigned nickname
    #[serde(default)]
    pub device_nick_name: String,
    /// Room the user placed the appliance in
    #[serde(default)]
    pub room_name: String,
    /// Online flag: 1 means reachable from the cloud
    #[serde(default)]
    pub offline_state: i64,
    /// Current raw status map
    #[serde(default)]
    pub status_list: HashMap<String, StatusValue>,
}

impl Appliance {
    /// Model key selecting which dictionary applies to this appliance.
    pub fn model_key(&self) -> String {
        format!("{}-{}", self.device_type_code, self.device_feature_code)
    }

    /// Whether the cloud considers the appliance reachable.
    pub fn is_online(&self) -> bool {
        self.offline_state == 1
    }
}

/// Transport trait for the ConnectLife cloud API.
///
/// The polling coordinator only depends on this trait; tests substitute a
/// scripted mock.
#[async_trait]
pub trait ApplianceClient: Send + Sync {
    /// Authenticate against the cloud, obtaining a session token
    async fn login(&self) -> Result<()>;

    /// Fetch the full appliance list with current raw status maps
    async fn get_appliances(&self) -> Result<Vec<Appliance>>;

    /// Write raw properties to one appliance.
    ///
    /// All values are serialized as strings on the wire; the cloud applies
    /// the keys of one call as a unit or fails the call.
    async fn update_appliance(
        &self,
        puid: &str,
        properties: HashMap<String, String>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_value_parsing() {
        let v: StatusValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, StatusValue::Int(42));
        assert_eq!(v.as_code(), Some(42));

        let v: StatusValue = serde_json::from_str("21.5").unwrap();
        assert_eq!(v.as_number(), Some(21.5));
        assert_eq!(v.as_code(), None);

        let v: StatusValue = serde_json::from_str("\"2024-05-01T10:00:00Z\"").unwrap();
        assert!(v.as_timestamp().is_some());

        let v: StatusValue = serde_json::from_str("\"filter\"").unwrap();
        assert_eq!(v, StatusValue::Str("filter".to_string()));
    }

    #[test]
    fn model_key_combines_type_and_feature() {
        let appliance = Appliance {
            device_id: "d1".into(),
            puid: "p1".into(),
            device_type_code: "009".into(),
            device_feature_code: "109".into(),
            device_feature_name: String::new(),
            device_nick_name: String::new(),
            room_name: String::new(),
            offline_state: 1,
            status_list: HashMap::new(),
        };
        assert_eq!(appliance.model_key(), "009-109");
        assert!(appliance.is_online());
    }
}
