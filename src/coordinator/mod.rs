//! Polling coordinator: periodic refresh, failure grace and optimistic
//! writes.
//!
//! One coordinator owns the device snapshot map, the dictionary store and
//! the retry budget. Consumers subscribe to a generation counter and re-read
//! the snapshot whenever it ticks.

use crate::client::{Appliance, ApplianceClient};
use crate::command::{WriteRequest, DISABLE_BEEP_PROPERTY, DISABLE_BEEP_VALUE};
use crate::config::BridgeConfig;
use crate::dictionary::{Capability, Dictionary, DictionaryStore};
use crate::error::{BridgeError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consecutive failed polls tolerated before the refresh cycle errors.
///
/// The counter starts exhausted so the very first poll surfaces its failure
/// immediately instead of silently serving an empty snapshot.
pub const MAX_RETRIES: u32 = 3;

pub struct PollingCoordinator<C: ApplianceClient> {
    client: Arc<C>,
    config: BridgeConfig,
    dictionaries: DictionaryStore,
    data: RwLock<HashMap<String, Appliance>>,
    error_count: AtomicU32,
    generation: watch::Sender<u64>,
}

impl<C: ApplianceClient> PollingCoordinator<C> {
    pub fn new(client: Arc<C>, config: BridgeConfig) -> Self {
        let dictionaries = DictionaryStore::new(config.bridge.dictionary_dir.clone());
        let (generation, _) = watch::channel(0);
        Self {
            client,
            config,
            dictionaries,
            data: RwLock::new(HashMap::new()),
            error_count: AtomicU32::new(MAX_RETRIES),
            generation,
        }
    }

    /// Subscribe to snapshot generations; the receiver ticks after every
    /// successful refresh and every applied write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn dictionaries(&self) -> &DictionaryStore {
        &self.dictionaries
    }

    pub async fn appliance(&self, device_id: &str) -> Option<Appliance> {
        self.data.read().await.get(device_id).cloned()
    }

    pub async fn appliances(&self) -> Vec<Appliance> {
        self.data.read().await.values().cloned().collect()
    }

    /// Resolved dictionary for one known device.
    pub async fn dictionary_for(&self, device_id: &str) -> Option<Arc<Dictionary>> {
        let model_key = self.data.read().await.get(device_id)?.model_key();
        Some(self.dictionaries.resolve(&model_key))
    }

    fn bump_generation(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Fetch the appliance list and replace the snapshot.
    ///
    /// Authentication failures are fatal. Anything else consumes one retry;
    /// the stale snapshot keeps serving until the budget runs out.
    pub async fn refresh(&self) -> Result<()> {
        let fetched = timeout(
            self.config.cloud.request_timeout(),
            self.client.get_appliances(),
        )
        .await
        .map_err(|_| BridgeError::timeout("appliance list fetch timed out"))
        .and_then(|r| r);

        match fetched {
            Ok(appliances) => {
                debug!(count = appliances.len(), "refreshed appliance snapshot");
                let mut data = self.data.write().await;
                *data = appliances
                    .into_iter()
                    .map(|a| (a.device_id.clone(), a))
                    .collect();
                drop(data);
                self.error_count.store(0, Ordering::SeqCst);
                self.bump_generation();
                Ok(())
            }
            Err(e) if e.is_auth_error() => {
                error!(error = %e, "authentication rejected, stopping refresh");
                Err(e)
            }
            Err(e) => {
                let failures = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= MAX_RETRIES {
                    error!(error = %e, failures, "poll failed, retry budget exhausted");
                    Err(e)
                } else {
                    warn!(error = %e, remaining = MAX_RETRIES - failures,
                          "poll failed, serving stale snapshot");
                    Ok(())
                }
            }
        }
    }

    /// Send a composed write and, once the cloud accepts it, merge the
    /// expected raw values into the snapshot so consumers see the change
    /// before the next poll confirms it.
    pub async fn update_device(&self, device_id: &str, request: WriteRequest) -> Result<()> {
        if request.is_empty() {
            return Ok(());
        }
        let puid = self
            .appliance(device_id)
            .await
            .ok_or_else(|| BridgeError::not_found(format!("unknown device {device_id}")))?
            .puid;

        let mut writes = request.writes;
        if self.config.device_options(device_id).disable_beep {
            writes.insert(
                DISABLE_BEEP_PROPERTY.to_string(),
                DISABLE_BEEP_VALUE.to_string(),
            );
        }

        self.client.update_appliance(&puid, writes).await?;

        let mut data = self.data.write().await;
        if let Some(appliance) = data.get_mut(device_id) {
            appliance.status_list.extend(request.status_patch);
        }
        drop(data);
        self.bump_generation();
        Ok(())
    }

    /// Write one raw property directly, validating it against the schema.
    pub async fn set_raw_value(&self, device_id: &str, key: &str, value: f64) -> Result<()> {
        let appliance = self
            .appliance(device_id)
            .await
            .ok_or_else(|| BridgeError::not_found(format!("unknown device {device_id}")))?;
        let dictionary = self.dictionaries.resolve(&appliance.model_key());

        match &dictionary.lookup(key).descriptor().capability {
            Capability::Sensor(spec) => {
                if spec.read_only.unwrap_or(false) {
                    return Err(BridgeError::invalid_input(format!("{key} is read only")));
                }
            }
            Capability::Number(spec) => {
                if spec.min_value.is_some_and(|min| value < min)
                    || spec.max_value.is_some_and(|max| value > max)
                {
                    return Err(BridgeError::invalid_input(format!(
                        "{value} is outside the allowed range for {key}"
                    )));
                }
            }
            _ => {}
        }

        self.update_device(device_id, crate::command::compose_number(key, value))
            .await
    }

    /// Poll until cancelled. Only an authentication failure stops the loop;
    /// transient errors are already logged by `refresh` and the next tick
    /// tries again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.bridge.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poll loop cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        if e.is_auth_error() {
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}
