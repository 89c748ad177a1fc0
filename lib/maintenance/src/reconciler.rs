//! Drives a single replication source to its desired scheduled-task
//! state. Two tenant namespaces can both reference the same repository
//! (and therefore the same fingerprint); the first one to claim a
//! schedule for it wins, and every later request for a different
//! schedule is rejected and recorded as a conflict rather than silently
//! overwriting the claim.

use chrono::Utc;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::Api;

use fingerprint::RepositoryConfig;
use telemetry::{Operation, OperationLabels};

use crate::context::MaintenanceContext;
use crate::error::{is_already_exists, is_not_found, MaintenanceError};
use crate::labels;
use crate::source::ReplicationSourceInput;
use crate::task_builder::TaskSpecInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
  Created,
  Updated,
  Unchanged,
  ConflictRejected,
  Skipped,
}

/// Ensures a scheduled task exists for `source`'s repository and matches
/// its requested schedule, creating, updating, or rejecting the change
/// as the first-wins policy dictates.
pub async fn reconcile_for_source(
  ctx: &MaintenanceContext,
  source: &ReplicationSourceInput,
) -> Result<ReconcileOutcome, MaintenanceError> {
  if !source.has_required_fields() {
    return Err(MaintenanceError::config(
      "replication source is missing a required name, namespace, or repository reference",
    ));
  }

  if !source.maintenance.is_enabled() {
    return Ok(ReconcileOutcome::Skipped);
  }

  let kopia = source.kopia.as_ref().expect("checked by has_required_fields");

  let repo_cfg = RepositoryConfig {
    secret_ref: kopia.repository.clone(),
    custom_ca: kopia.custom_ca.clone(),
    namespace: source.namespace.clone(),
    schedule: source
      .maintenance
      .requested_schedule()
      .map(str::to_string),
  };
  let f = fingerprint::fingerprint(&repo_cfg);

  let schedule = repo_cfg
    .schedule
    .clone()
    .unwrap_or_else(|| ctx.builder.default_schedule.clone());

  let mirrored_secret_name = crate::secret_mirror::ensure_mirrored_secret(
    ctx,
    &source.namespace,
    &kopia.repository,
    &f,
  )
  .await?;
  crate::principal::ensure_service_principal(ctx).await?;

  let task_input = TaskSpecInput {
    fingerprint: &f,
    tenant_namespace: &source.namespace,
    secret_ref: &kopia.repository,
    mirrored_secret_name: &mirrored_secret_name,
    schedule: &schedule,
    custom_ca: kopia.custom_ca.as_ref(),
  };
  let mut desired = crate::task_builder::build_scheduled_task(
    &ctx.operator_namespace,
    &ctx.builder,
    &task_input,
  );

  let task_name = crate::naming::scheduled_task_name(&f);
  let tasks_api: Api<CronJob> =
    crate::client::scheduled_tasks(&ctx.client, &ctx.operator_namespace);

  let outcome = match tasks_api.get_opt(&task_name).await.map_err(MaintenanceError::Cluster)? {
    None => {
      migrate_legacy_task(ctx, &source.namespace, &f).await;

      desired.metadata.name = Some(task_name.clone());
      desired.metadata.namespace = Some(ctx.operator_namespace.clone());
      match tasks_api.create(&PostParams::default(), &desired).await {
        Ok(_) => {
          tracing::info!(task = task_name, fingerprint = f, "created scheduled task");
          ctx.telemetry.record(OperationLabels::new(
            task_name.clone(),
            ctx.operator_namespace.clone(),
            Operation::Created,
            kopia.repository.clone(),
          ));
          ReconcileOutcome::Created
        }
        Err(e) if is_already_exists(&e) => ReconcileOutcome::Unchanged,
        Err(e) => return Err(MaintenanceError::Cluster(e)),
      }
    }
    Some(existing) => {
      reconcile_existing(ctx, &existing, &desired, &task_name, &f, &source.namespace, &schedule, &kopia.repository).await?
    }
  };

  Ok(outcome)
}

/// Compares a tenant's requested schedule against the task that already
/// claims this fingerprint and decides what should happen to it, without
/// touching the cluster. The namespace that set the current schedule
/// keeps the right to change it; any other namespace requesting a
/// different schedule is rejected and the rejection is recorded as an
/// annotation for later audit. The sourceNamespace label/annotation is
/// refreshed to the latest requester regardless of outcome, so garbage
/// collection always attributes the task to whoever touched it last.
fn resolve_schedule_conflict(
  existing: &CronJob,
  desired: &CronJob,
  tenant_namespace: &str,
  requested_schedule: &str,
) -> (ReconcileOutcome, CronJob) {
  let existing_schedule = existing
    .spec
    .as_ref()
    .map(|s| s.schedule.as_str())
    .unwrap_or_default();
  let claimer = existing
    .metadata
    .labels
    .as_ref()
    .and_then(|l| l.get(labels::LABEL_SOURCE_NAMESPACE))
    .cloned()
    .unwrap_or_default();

  let mut updated = existing.clone();
  updated
    .metadata
    .labels
    .get_or_insert_with(Default::default)
    .insert(
      labels::LABEL_SOURCE_NAMESPACE.to_string(),
      tenant_namespace.to_string(),
    );
  updated
    .metadata
    .annotations
    .get_or_insert_with(Default::default)
    .insert(
      labels::ANNOTATION_SOURCE_NAMESPACE.to_string(),
      tenant_namespace.to_string(),
    );

  let outcome = if existing_schedule == requested_schedule {
    ReconcileOutcome::Unchanged
  } else if claimer == tenant_namespace {
    updated.spec = desired.spec.clone();
    updated
      .metadata
      .annotations
      .get_or_insert_with(Default::default)
      .remove(labels::ANNOTATION_CONFLICT);
    ReconcileOutcome::Updated
  } else {
    let audit_line = format!(
      "Last conflict: Schedule '{requested_schedule}' requested from namespace '{tenant_namespace}' at {} (rejected - first-wins strategy)",
      Utc::now().to_rfc3339(),
    );
    updated
      .metadata
      .annotations
      .get_or_insert_with(Default::default)
      .insert(labels::ANNOTATION_CONFLICT.to_string(), audit_line);
    ReconcileOutcome::ConflictRejected
  };

  (outcome, updated)
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_existing(
  ctx: &MaintenanceContext,
  existing: &CronJob,
  desired: &CronJob,
  task_name: &str,
  fingerprint: &str,
  tenant_namespace: &str,
  requested_schedule: &str,
  repository: &str,
) -> Result<ReconcileOutcome, MaintenanceError> {
  let tasks_api: Api<CronJob> =
    crate::client::scheduled_tasks(&ctx.client, &ctx.operator_namespace);

  let (outcome, updated) =
    resolve_schedule_conflict(existing, desired, tenant_namespace, requested_schedule);

  if outcome == ReconcileOutcome::ConflictRejected {
    let claimer = existing
      .metadata
      .labels
      .as_ref()
      .and_then(|l| l.get(labels::LABEL_SOURCE_NAMESPACE))
      .cloned()
      .unwrap_or_default();
    tracing::info!(
      task = task_name,
      fingerprint,
      requested_schedule,
      claimer,
      requester = tenant_namespace,
      "schedule change rejected by first-wins policy"
    );
  }

  tasks_api
    .replace(task_name, &PostParams::default(), &updated)
    .await
    .map_err(MaintenanceError::Cluster)?;

  match outcome {
    ReconcileOutcome::Updated => {
      ctx.telemetry.record(OperationLabels::new(
        task_name.to_string(),
        ctx.operator_namespace.clone(),
        Operation::Updated,
        repository.to_string(),
      ));
    }
    ReconcileOutcome::ConflictRejected => {
      ctx.telemetry.record(OperationLabels::new(
        task_name.to_string(),
        ctx.operator_namespace.clone(),
        Operation::ConflictRejected,
        repository.to_string(),
      ));
    }
    _ => {}
  }

  Ok(outcome)
}

/// Looks up a task of the same name in the tenant's own namespace (the
/// layout used before scheduled tasks were centralized into the operator
/// namespace); if present, deletes it and any job objects it left behind
/// tagged with this fingerprint. Failures are logged, never propagated -
/// migration is best-effort.
async fn migrate_legacy_task(
  ctx: &MaintenanceContext,
  tenant_namespace: &str,
  fingerprint: &str,
) {
  let task_name = crate::naming::scheduled_task_name(fingerprint);
  let legacy_tasks: Api<CronJob> =
    crate::client::scheduled_tasks(&ctx.client, tenant_namespace);

  match legacy_tasks.get_opt(&task_name).await {
    Ok(Some(_)) => {
      if let Err(e) = legacy_tasks
        .delete(&task_name, &DeleteParams::default())
        .await
      {
        if !is_not_found(&e) {
          tracing::error!(
            task = task_name,
            namespace = tenant_namespace,
            error = %e,
            "failed to delete legacy scheduled task during migration"
          );
          ctx.telemetry.record(OperationLabels::new(
            task_name.clone(),
            tenant_namespace.to_string(),
            Operation::MigrationFailed,
            fingerprint.to_string(),
          ));
          return;
        }
      }
      delete_legacy_jobs(ctx, tenant_namespace, fingerprint).await;
    }
    Ok(None) => {}
    Err(e) => {
      tracing::error!(
        namespace = tenant_namespace,
        error = %e,
        "failed to look up legacy scheduled task during migration"
      );
    }
  }
}

async fn delete_legacy_jobs(
  ctx: &MaintenanceContext,
  tenant_namespace: &str,
  fingerprint: &str,
) {
  let jobs_api: Api<Job> =
    crate::client::jobs(&ctx.client, tenant_namespace);
  let selector = format!("{}={fingerprint}", labels::LABEL_FINGERPRINT);
  let list = match jobs_api
    .list(&ListParams::default().labels(&selector))
    .await
  {
    Ok(list) => list,
    Err(e) => {
      tracing::error!(
        namespace = tenant_namespace,
        error = %e,
        "failed to list legacy jobs during migration"
      );
      return;
    }
  };
  for job in list.items {
    let Some(name) = job.metadata.name.clone() else {
      continue;
    };
    if let Err(e) = jobs_api.delete(&name, &DeleteParams::default()).await {
      if !is_not_found(&e) {
        tracing::error!(
          job = name,
          namespace = tenant_namespace,
          error = %e,
          "failed to delete legacy job during migration"
        );
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::{KopiaSourceSpec, MaintenanceEnablement};

  fn source_with(
    namespace: &str,
    schedule: Option<&str>,
  ) -> ReplicationSourceInput {
    ReplicationSourceInput {
      name: "s".to_string(),
      namespace: namespace.to_string(),
      kopia: Some(KopiaSourceSpec {
        repository: "repo".to_string(),
        custom_ca: None,
        username: None,
        hostname: None,
        compression: None,
        additional_args: vec![],
        policy_config: None,
      }),
      maintenance: MaintenanceEnablement::Enabled {
        schedule: schedule.map(str::to_string),
      },
    }
  }

  #[test]
  fn disabled_maintenance_is_never_rejected() {
    let mut source = source_with("team-a", None);
    source.maintenance = MaintenanceEnablement::Disabled;
    assert!(!source.maintenance.is_enabled());
  }

  #[test]
  fn fingerprint_is_namespace_and_schedule_independent() {
    let a = source_with("team-a", Some("0 1 * * *"));
    let b = source_with("team-b", Some("0 3 * * *"));
    let cfg_a = RepositoryConfig {
      secret_ref: a.kopia.as_ref().unwrap().repository.clone(),
      custom_ca: None,
      namespace: a.namespace.clone(),
      schedule: a.maintenance.requested_schedule().map(str::to_string),
    };
    let cfg_b = RepositoryConfig {
      secret_ref: b.kopia.as_ref().unwrap().repository.clone(),
      custom_ca: None,
      namespace: b.namespace.clone(),
      schedule: b.maintenance.requested_schedule().map(str::to_string),
    };
    assert_eq!(
      fingerprint::fingerprint(&cfg_a),
      fingerprint::fingerprint(&cfg_b)
    );
  }

  fn cron_job_with(
    schedule: &str,
    claimer_namespace: &str,
  ) -> CronJob {
    CronJob {
      metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        labels: Some(std::collections::BTreeMap::from([(
          labels::LABEL_SOURCE_NAMESPACE.to_string(),
          claimer_namespace.to_string(),
        )])),
        ..Default::default()
      },
      spec: Some(k8s_openapi::api::batch::v1::CronJobSpec {
        schedule: schedule.to_string(),
        ..Default::default()
      }),
      status: None,
    }
  }

  #[test]
  fn second_namespace_requesting_a_different_schedule_is_rejected() {
    let existing = cron_job_with("0 1 * * *", "team-a");
    let desired = cron_job_with("0 3 * * *", "team-b");
    let (outcome, updated) = resolve_schedule_conflict(
      &existing,
      &desired,
      "team-b",
      "0 3 * * *",
    );
    assert_eq!(outcome, ReconcileOutcome::ConflictRejected);
    assert_eq!(updated.spec.unwrap().schedule, "0 1 * * *");
    let conflict = updated
      .metadata
      .annotations
      .unwrap()
      .get(labels::ANNOTATION_CONFLICT)
      .cloned()
      .unwrap();
    assert!(conflict.contains("0 3 * * *"));
    assert!(conflict.contains("team-b"));
    assert!(conflict.ends_with("(rejected - first-wins strategy)"));
  }

  #[test]
  fn same_namespace_can_change_its_own_schedule() {
    let existing = cron_job_with("0 1 * * *", "team-a");
    let desired = cron_job_with("0 3 * * *", "team-a");
    let (outcome, updated) = resolve_schedule_conflict(
      &existing,
      &desired,
      "team-a",
      "0 3 * * *",
    );
    assert_eq!(outcome, ReconcileOutcome::Updated);
    assert_eq!(updated.spec.unwrap().schedule, "0 3 * * *");
    assert!(
      updated
        .metadata
        .annotations
        .unwrap_or_default()
        .get(labels::ANNOTATION_CONFLICT)
        .is_none()
    );
  }

  #[test]
  fn matching_schedule_is_left_unchanged() {
    let existing = cron_job_with("0 1 * * *", "team-a");
    let desired = cron_job_with("0 1 * * *", "team-b");
    let (outcome, _updated) = resolve_schedule_conflict(
      &existing,
      &desired,
      "team-b",
      "0 1 * * *",
    );
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
  }
}
