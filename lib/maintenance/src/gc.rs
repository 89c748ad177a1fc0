//! Reclaims scheduled tasks and mirrored secrets that no longer have a
//! claiming replication source, either because the source was deleted or
//! maintenance was disabled on it.

use std::collections::HashSet;

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, ListParams};
use kube::Api;

use fingerprint::RepositoryConfig;
use telemetry::{Operation, OperationLabels};

use crate::context::MaintenanceContext;
use crate::error::{is_not_found, MaintenanceError};
use crate::labels;

#[derive(Debug, Default, Clone)]
pub struct GcReport {
  pub tasks_deleted: Vec<String>,
  pub secrets_deleted: Vec<String>,
}

/// Deletes every scheduled task and mirrored secret last claimed by
/// `tenant_namespace` that no source in this namespace still requires,
/// provided no other namespace has since claimed the same fingerprint.
pub async fn sweep(
  ctx: &MaintenanceContext,
  tenant_namespace: &str,
) -> Result<GcReport, MaintenanceError> {
  let mut report = GcReport::default();

  let local_sources = ctx
    .sources
    .list_namespace(tenant_namespace)
    .await
    .map_err(MaintenanceError::Other)?;
  let required: HashSet<String> =
    claimed_fingerprints(&local_sources);

  let tasks_api: Api<CronJob> =
    crate::client::scheduled_tasks(&ctx.client, &ctx.operator_namespace);
  let selector = format!(
    "{}={tenant_namespace}",
    labels::LABEL_SOURCE_NAMESPACE
  );
  let tasks = tasks_api
    .list(&ListParams::default().labels(&selector))
    .await
    .map_err(MaintenanceError::Cluster)?;

  // The cluster-wide claim check below is the same for every orphan
  // candidate in this sweep; fetched at most once per sweep call instead
  // of once per candidate, and reused across sibling namespaces within
  // the same garbage-collection tick via `ctx.claims_cache`.
  let mut cluster_wide_claims: Option<HashSet<String>> = None;

  for task in tasks.items {
    let Some(task_fingerprint) = task
      .metadata
      .labels
      .as_ref()
      .and_then(|l| l.get(labels::LABEL_FINGERPRINT))
      .cloned()
    else {
      continue;
    };
    if required.contains(&task_fingerprint) {
      continue;
    }

    if cluster_wide_claims.is_none() {
      let all_sources = cluster_wide_sources(ctx).await?;
      cluster_wide_claims = Some(claimed_fingerprints(&all_sources));
    }
    let still_claimed = cluster_wide_claims
      .as_ref()
      .expect("populated above")
      .contains(&task_fingerprint);
    if still_claimed {
      continue;
    }

    let Some(name) = task.metadata.name.clone() else {
      continue;
    };
    match tasks_api.delete(&name, &DeleteParams::default()).await {
      Ok(_) => {
        tracing::info!(task = name, fingerprint = task_fingerprint, "garbage-collected orphaned scheduled task");
        ctx.telemetry.record(OperationLabels::new(
          name.clone(),
          ctx.operator_namespace.clone(),
          Operation::Deleted,
          task_fingerprint.clone(),
        ));
        report.tasks_deleted.push(name);
      }
      Err(e) if is_not_found(&e) => {}
      Err(e) => return Err(MaintenanceError::Cluster(e)),
    }
  }

  let required_secret_names: HashSet<String> = local_sources
    .iter()
    .filter(|s| s.maintenance.is_enabled())
    .filter_map(|s| {
      let kopia = s.kopia.as_ref()?;
      let cfg = RepositoryConfig {
        secret_ref: kopia.repository.clone(),
        custom_ca: kopia.custom_ca.clone(),
        namespace: s.namespace.clone(),
        schedule: None,
      };
      let f = fingerprint::fingerprint(&cfg);
      Some(crate::naming::mirrored_secret_name(
        &s.namespace,
        &kopia.repository,
        &f,
      ))
    })
    .collect();

  let secrets_api: Api<Secret> =
    crate::client::secrets(&ctx.client, &ctx.operator_namespace);
  let secret_selector = format!(
    "{}={tenant_namespace}",
    labels::LABEL_SOURCE_NAMESPACE
  );
  let mirrored_secrets = secrets_api
    .list(&ListParams::default().labels(&secret_selector))
    .await
    .map_err(MaintenanceError::Cluster)?;

  for secret in mirrored_secrets.items {
    let Some(name) = secret.metadata.name.clone() else {
      continue;
    };
    if required_secret_names.contains(&name) {
      continue;
    }
    match secrets_api.delete(&name, &DeleteParams::default()).await {
      Ok(_) => {
        tracing::info!(secret = name, "garbage-collected orphaned mirrored secret");
        report.secrets_deleted.push(name);
      }
      Err(e) if is_not_found(&e) => {}
      Err(e) => return Err(MaintenanceError::Cluster(e)),
    }
  }

  ctx.telemetry.record(OperationLabels::new(
    tenant_namespace.to_string(),
    ctx.operator_namespace.clone(),
    Operation::Swept,
    String::new(),
  ));

  Ok(report)
}

/// Cluster-wide source listing, cached under
/// [`crate::context::ALL_SOURCES_CACHE_KEY`] for the span of one
/// garbage-collection tick. `gc_loop` clears this key before each tick
/// so the cache never outlives the snapshot it was built from.
async fn cluster_wide_sources(
  ctx: &MaintenanceContext,
) -> Result<Vec<crate::source::ReplicationSourceInput>, MaintenanceError> {
  if let Some(cached) = ctx
    .claims_cache
    .get(&crate::context::ALL_SOURCES_CACHE_KEY.to_string())
    .await
  {
    return Ok(cached);
  }
  let all_sources = ctx
    .sources
    .list_all()
    .await
    .map_err(MaintenanceError::Other)?;
  ctx
    .claims_cache
    .insert(
      crate::context::ALL_SOURCES_CACHE_KEY.to_string(),
      all_sources.clone(),
    )
    .await;
  Ok(all_sources)
}

fn claimed_fingerprints(
  sources: &[crate::source::ReplicationSourceInput],
) -> HashSet<String> {
  sources
    .iter()
    .filter(|s| s.maintenance.is_enabled())
    .filter_map(|s| {
      let kopia = s.kopia.as_ref()?;
      let cfg = RepositoryConfig {
        secret_ref: kopia.repository.clone(),
        custom_ca: kopia.custom_ca.clone(),
        namespace: s.namespace.clone(),
        schedule: None,
      };
      Some(fingerprint::fingerprint(&cfg))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::{
    KopiaSourceSpec, MaintenanceEnablement, ReplicationSourceInput,
  };

  fn source(namespace: &str, repo: &str, enabled: bool) -> ReplicationSourceInput {
    ReplicationSourceInput {
      name: "s".to_string(),
      namespace: namespace.to_string(),
      kopia: Some(KopiaSourceSpec {
        repository: repo.to_string(),
        custom_ca: None,
        username: None,
        hostname: None,
        compression: None,
        additional_args: vec![],
        policy_config: None,
      }),
      maintenance: if enabled {
        MaintenanceEnablement::Enabled { schedule: None }
      } else {
        MaintenanceEnablement::Disabled
      },
    }
  }

  #[test]
  fn disabled_sources_do_not_contribute_a_claim() {
    let sources = vec![source("a", "repo", false)];
    assert!(claimed_fingerprints(&sources).is_empty());
  }

  #[test]
  fn same_repo_different_namespace_shares_one_fingerprint() {
    let sources = vec![
      source("a", "repo", true),
      source("b", "repo", true),
    ];
    assert_eq!(claimed_fingerprints(&sources).len(), 1);
  }
}
