//! ConnectLife bridge daemon.

use anyhow::Context;
use clap::Parser;
use connectlife_bridge::client::http_client::HttpApplianceClient;
use connectlife_bridge::client::ApplianceClient;
use connectlife_bridge::registry::EntityRegistry;
use connectlife_bridge::state::ClimateEntity;
use connectlife_bridge::{BridgeConfig, PollingCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "connectlife-bridge", about = "ConnectLife appliance bridge", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "bridge.toml", env = "CONNECTLIFE_BRIDGE_CONFIG")]
    config: PathBuf,

    /// Poll once, print the derived entities, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = BridgeConfig::load(&args.config)
        .await
        .context("loading configuration")?;

    let client = Arc::new(HttpApplianceClient::new(&config.cloud)?);
    client
        .login()
        .await
        .context("cloud login failed; check the [cloud] credentials")?;

    let coordinator = Arc::new(PollingCoordinator::new(client, config));
    coordinator.refresh().await.context("initial poll")?;

    let mut registry = EntityRegistry::new();
    let appliances = coordinator.appliances().await;
    let report = registry.reconcile(&appliances, coordinator.dictionaries());
    info!(
        devices = appliances.len(),
        entities = report.added.len(),
        "initial reconcile complete"
    );

    if args.once {
        let mut entities: Vec<_> = registry
            .entities()
            .map(|r| format!("{} ({:?})", r.entity_id, r.kind))
            .collect();
        entities.sort();
        for entity in entities {
            println!("{entity}");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut generations = coordinator.subscribe();

    let mut poll = {
        let coordinator = Arc::clone(&coordinator);
        let cancel = cancel.clone();
        tokio::spawn(async move { coordinator.run(cancel).await })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                cancel.cancel();
                break;
            }
            finished = &mut poll => {
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e).context("poll loop failed"),
                    Err(e) => {
                        warn!(error = %e, "poll task aborted");
                        Ok(())
                    }
                };
            }
            result = generations.changed() => {
                if result.is_err() {
                    break;
                }
                let appliances = coordinator.appliances().await;
                let report = registry.reconcile(&appliances, coordinator.dictionaries());
                if !report.is_empty() {
                    info!(
                        added = report.added.len(),
                        removed = report.removed.len(),
                        raised = report.issues_raised.len(),
                        cleared = report.issues_cleared.len(),
                        "entity set reconciled"
                    );
                }
                log_climate_states(&coordinator, &appliances).await;
            }
        }
    }

    match poll.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("poll loop failed"),
        Err(e) => {
            warn!(error = %e, "poll task aborted");
            Ok(())
        }
    }
}

/// Debug smoke surface: the projected climate state per device, each tick.
async fn log_climate_states<C: connectlife_bridge::ApplianceClient>(
    coordinator: &PollingCoordinator<C>,
    appliances: &[connectlife_bridge::Appliance],
) {
    for appliance in appliances {
        let Some(dictionary) = coordinator.dictionary_for(&appliance.device_id).await else {
            continue;
        };
        let Some(entity) = ClimateEntity::from_dictionary(&appliance.model_key(), &dictionary)
        else {
            continue;
        };
        let state = entity.project(appliance, None);
        debug!(
            device = %appliance.device_id,
            mode = ?state.effective_hvac_mode(),
            target = ?state.target_temperature,
            available = state.available,
            "climate state"
        );
    }
}
