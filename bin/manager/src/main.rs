//! Centralized maintenance-scheduler controller entrypoint: wires
//! configuration, logging, telemetry, and a `kube_runtime` reconcile
//! loop over replication sources into `lib/maintenance`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use maintenance::context::{BuilderConfig, MaintenanceContext};

#[macro_use]
extern crate tracing;

mod config;
mod crd;
mod gc_loop;
mod reconcile;
mod sources;

use config::config;
use crd::ReplicationSource;
use sources::KubeSourceLister;

/// Maintenance-scheduler controller. Configuration itself is read from
/// the environment (`config::ManagerConfig`); these flags only cover
/// one-shot startup behavior.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
  /// Print the resolved configuration as JSON and exit without
  /// starting the controller.
  #[arg(long)]
  print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let config = config();

  if cli.print_config {
    println!("{}", serde_json::to_string_pretty(config)?);
    return Ok(());
  }

  logger::init(&config.logging)?;

  info!(
    "komodo maintenance-manager version: v{}",
    env!("CARGO_PKG_VERSION")
  );
  info!("operator namespace: {}", config.operator_namespace);

  let client = Client::try_default().await?;
  let (telemetry, _registry) = telemetry::Telemetry::new();

  let ctx = Arc::new(MaintenanceContext::new(
    client.clone(),
    config.operator_namespace.clone(),
    BuilderConfig::from(&config.builder),
    Arc::new(telemetry),
    Arc::new(KubeSourceLister::new(client.clone())),
  ));

  let gc_ctx = ctx.clone();
  let sweep_interval =
    Duration::from_secs(config.sweep_interval_seconds);
  tokio::spawn(async move {
    gc_loop::run(gc_ctx, sweep_interval).await;
  });

  let sources: Api<ReplicationSource> = Api::all(client);
  Controller::new(sources, watcher::Config::default())
    .shutdown_on_signal()
    .run(reconcile::reconcile, reconcile::error_policy, ctx)
    .for_each(|result| async move {
      if let Err(e) = result {
        error!("reconcile stream error: {e:?}");
      }
    })
    .await;

  info!("maintenance-manager controller stopped");
  Ok(())
}
