//! ConnectLife bridge: a dictionary-driven property mapping engine for
//! ConnectLife cloud appliances.
//!
//! Appliances report opaque raw status maps. Per-model dictionary schemas
//! describe how those raw keys project to typed entities (sensors, switches,
//! climate devices, ...) and how typed commands translate back into raw
//! property writes. A polling coordinator keeps a device snapshot fresh and
//! an entity registry reconciles the derived entity set across polls.

pub mod client;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod dictionary;
pub mod error;
pub mod registry;
pub mod state;

pub use client::{Appliance, ApplianceClient, StatusValue};
pub use config::BridgeConfig;
pub use coordinator::PollingCoordinator;
pub use error::{BridgeError, Result};
