//! `kube_runtime::Controller` glue: translates watch events on
//! [`ReplicationSource`] into calls to `maintenance::reconciler`,
//! serialized per object key and retried on failure.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use maintenance::context::MaintenanceContext;
use maintenance::error::MaintenanceError;
use maintenance::reconciler::{reconcile_for_source, ReconcileOutcome};
use telemetry::{Operation, OperationLabels};

use crate::crd::{to_source_input, ReplicationSource};

/// Requeue delay after a successful pass (or a benign skip) -
/// reconciliations are idempotent, so this is purely a freshness
/// heartbeat, not a correctness requirement.
const SUCCESS_REQUEUE: Duration = Duration::from_secs(3600);
/// Requeue delay after a retryable failure. Every non-benign error is
/// treated as retryable by the reconciler.
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

pub async fn reconcile(
  source: Arc<ReplicationSource>,
  ctx: Arc<MaintenanceContext>,
) -> Result<Action, MaintenanceError> {
  let input = to_source_input(&source);
  let name = input.name.clone();
  let namespace = input.namespace.clone();

  match reconcile_for_source(&ctx, &input).await {
    Ok(outcome) => {
      log_outcome(&name, &namespace, outcome);
      Ok(Action::requeue(SUCCESS_REQUEUE))
    }
    Err(MaintenanceError::Config(msg)) => {
      tracing::error!(
        source = name,
        namespace,
        %msg,
        "invalid configuration"
      );
      ctx.telemetry.record_configuration_error(
        OperationLabels::new(
          name,
          namespace,
          Operation::Failed,
          String::new(),
        ),
      );
      // Configuration errors are synchronous and won't resolve on
      // their own; still requeue (on the long interval) so a fixed CR
      // eventually reconciles again without operator intervention.
      Ok(Action::requeue(SUCCESS_REQUEUE))
    }
    Err(e) => {
      tracing::error!(
        source = name,
        namespace,
        error = %e,
        "reconciliation failed, will retry"
      );
      Err(e)
    }
  }
}

fn log_outcome(name: &str, namespace: &str, outcome: ReconcileOutcome) {
  match outcome {
    ReconcileOutcome::Created => {
      tracing::info!(source = name, namespace, "scheduled task created")
    }
    ReconcileOutcome::Updated => {
      tracing::info!(
        source = name,
        namespace,
        "scheduled task schedule updated"
      )
    }
    ReconcileOutcome::ConflictRejected => tracing::info!(
      source = name,
      namespace,
      "schedule change rejected by first-wins policy"
    ),
    ReconcileOutcome::Unchanged => {
      tracing::debug!(source = name, namespace, "no change needed")
    }
    ReconcileOutcome::Skipped => {
      tracing::debug!(source = name, namespace, "maintenance disabled")
    }
  }
}

pub fn error_policy(
  _source: Arc<ReplicationSource>,
  _error: &MaintenanceError,
  _ctx: Arc<MaintenanceContext>,
) -> Action {
  Action::requeue(ERROR_REQUEUE)
}
