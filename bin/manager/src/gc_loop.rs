//! Namespace-level garbage-collection sweep loop. Runs independently of
//! the per-source reconciler, on a fixed interval, iterating every
//! tenant namespace currently holding at least one replication source.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use maintenance::context::{MaintenanceContext, ALL_SOURCES_CACHE_KEY};

pub async fn run(ctx: Arc<MaintenanceContext>, interval: Duration) {
  let mut ticker = tokio::time::interval(interval);
  loop {
    ticker.tick().await;
    if let Err(e) = sweep_all_namespaces(&ctx).await {
      tracing::error!(error = %e, "garbage-collection sweep failed");
    }
  }
}

async fn sweep_all_namespaces(
  ctx: &MaintenanceContext,
) -> anyhow::Result<()> {
  let sources = ctx.sources.list_all().await?;
  let namespaces: BTreeSet<String> =
    sources.iter().map(|s| s.namespace.clone()).collect();

  // Seed this tick's cluster-wide snapshot so every per-namespace
  // `gc::sweep` call below reuses it instead of re-listing. Cleared
  // implicitly by being overwritten next tick; a listing never outlives
  // the tick it was fetched for.
  ctx
    .claims_cache
    .insert(ALL_SOURCES_CACHE_KEY.to_string(), sources)
    .await;

  for namespace in namespaces {
    match maintenance::gc::sweep(ctx, &namespace).await {
      Ok(report) => {
        if !report.tasks_deleted.is_empty()
          || !report.secrets_deleted.is_empty()
        {
          tracing::info!(
            namespace,
            tasks_deleted = report.tasks_deleted.len(),
            secrets_deleted = report.secrets_deleted.len(),
            "garbage-collection sweep completed"
          );
        }
      }
      Err(e) => {
        tracing::error!(
          namespace,
          error = %e,
          "garbage-collection sweep failed for namespace"
        );
      }
    }
  }
  Ok(())
}
