//! Aggregates a fingerprint's scheduled task and its recent job history
//! into a single status report, and records the corresponding telemetry
//! readings along the way.

use chrono::{DateTime, Months, Utc};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::api::ListParams;
use kube::Api;
use telemetry::{Operation, OperationLabels};

use crate::context::MaintenanceContext;
use crate::error::MaintenanceError;
use crate::labels;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
  pub configured: bool,
  pub last_successful_time: Option<DateTime<Utc>>,
  pub last_failed_time: Option<DateTime<Utc>>,
  pub failures_since_last_success: u32,
  pub last_duration: Option<String>,
  pub next_scheduled_time: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

const MAX_JOBS_ANALYZED: usize = 50;

/// Locates the task for `fingerprint` and analyzes its recent job
/// history.
pub async fn status_for_fingerprint(
  ctx: &MaintenanceContext,
  fingerprint: &str,
) -> Result<StatusReport, MaintenanceError> {
  let task_name = crate::naming::scheduled_task_name(fingerprint);
  let tasks_api: Api<CronJob> =
    crate::client::scheduled_tasks(&ctx.client, &ctx.operator_namespace);

  let Some(task) = tasks_api
    .get_opt(&task_name)
    .await
    .map_err(MaintenanceError::Cluster)?
  else {
    return Ok(StatusReport::default());
  };

  let jobs_api: Api<Job> =
    crate::client::jobs(&ctx.client, &ctx.operator_namespace);
  let selector = format!(
    "{}=true,{}={fingerprint}",
    labels::LABEL_MARKER,
    labels::LABEL_FINGERPRINT
  );
  let mut jobs = jobs_api
    .list(&ListParams::default().labels(&selector))
    .await
    .map_err(MaintenanceError::Cluster)?
    .items;

  jobs.sort_by(|a, b| {
    creation_timestamp(b)
      .cmp(&creation_timestamp(a))
      .then_with(|| job_name(b).cmp(&job_name(a)))
  });
  jobs.truncate(MAX_JOBS_ANALYZED);

  let mut report = analyze_jobs(&jobs);
  report.configured = true;
  report.next_scheduled_time = next_scheduled_time(&task);

  let repository = task
    .metadata
    .annotations
    .as_ref()
    .and_then(|a| a.get(labels::ANNOTATION_REPOSITORY))
    .cloned()
    .unwrap_or_default();
  emit_status_telemetry(
    &ctx.telemetry,
    &ctx.operator_namespace,
    &task_name,
    repository,
    &report,
  );

  Ok(report)
}

/// Records the duration histogram and last-run gauge that a caller
/// polling this fingerprint's status would otherwise have no way to
/// populate, since only this aggregation step has the job history in
/// hand.
fn emit_status_telemetry(
  telemetry: &telemetry::Telemetry,
  operator_namespace: &str,
  task_name: &str,
  repository: String,
  report: &StatusReport,
) {
  if let Some(seconds) = report
    .last_duration
    .as_ref()
    .and_then(|s| s.trim_end_matches('s').parse::<f64>().ok())
  {
    telemetry.record_duration(
      OperationLabels::new(
        task_name.to_string(),
        operator_namespace.to_string(),
        Operation::Observed,
        repository.clone(),
      ),
      seconds,
    );
  }
  if let Some(last_success) = report.last_successful_time {
    telemetry.record_last_run(
      OperationLabels::new(
        task_name.to_string(),
        operator_namespace.to_string(),
        Operation::Observed,
        repository,
      ),
      last_success.timestamp(),
    );
  }
}

fn analyze_jobs(jobs: &[Job]) -> StatusReport {
  let mut report = StatusReport {
    configured: true,
    ..Default::default()
  };

  let mut found_first_success = false;
  for job in jobs {
    let Some(status) = job.status.as_ref() else {
      continue;
    };
    // A job without a completion time is not a terminal job yet; ignore
    // it entirely.
    if status.completion_time.is_none() {
      continue;
    }
    let conditions = status.conditions.as_deref().unwrap_or(&[]);
    let succeeded = conditions
      .iter()
      .any(|c| c.type_ == "Complete" && c.status == "True");
    let failed = conditions
      .iter()
      .find(|c| c.type_ == "Failed" && c.status == "True");

    if succeeded {
      if report.last_successful_time.is_none() {
        report.last_successful_time =
          status.completion_time.as_ref().map(|t| t.0);
        report.last_duration = duration_string(status);
      }
      found_first_success = true;
      continue;
    }

    if let Some(failed) = failed {
      if report.last_failed_time.is_none() {
        report.last_failed_time =
          status.completion_time.as_ref().map(|t| t.0);
        report.last_error = failed.message.clone();
      }
      if !found_first_success {
        report.failures_since_last_success += 1;
      }
    }
  }

  report
}

fn duration_string(
  status: &k8s_openapi::api::batch::v1::JobStatus,
) -> Option<String> {
  let start = status.start_time.as_ref()?.0;
  let completion = status.completion_time.as_ref()?.0;
  let seconds = (completion - start).num_seconds().max(0);
  Some(format!("{seconds}s"))
}

fn creation_timestamp(job: &Job) -> DateTime<Utc> {
  job
    .metadata
    .creation_timestamp
    .as_ref()
    .map(|t| t.0)
    .unwrap_or_default()
}

fn job_name(job: &Job) -> &str {
  job.metadata.name.as_deref().unwrap_or_default()
}

/// Coarse `lastScheduledTime + Δ(schedule)` approximation. Exact
/// cron-next-fire parsing is explicitly out of scope.
fn next_scheduled_time(task: &CronJob) -> Option<DateTime<Utc>> {
  let last_scheduled = task.status.as_ref()?.last_schedule_time.as_ref()?.0;
  let schedule = task.spec.as_ref()?.schedule.as_str();
  Some(last_scheduled + coarse_interval(schedule, last_scheduled))
}

fn coarse_interval(
  schedule: &str,
  from: DateTime<Utc>,
) -> chrono::Duration {
  let fields: Vec<&str> = schedule.split_whitespace().collect();
  if fields.len() != 5 {
    return chrono::Duration::hours(24);
  }
  let [_minute, _hour, day, month, weekday] =
    [fields[0], fields[1], fields[2], fields[3], fields[4]];

  if day == "1" && month == "*" {
    // monthly-1st
    if let Some(next) = from.checked_add_months(Months::new(1)) {
      return next - from;
    }
  }
  if weekday == "0" && day == "*" {
    // weekly-Sun
    return chrono::Duration::days(7);
  }
  // daily-at-2 and everything else: 24h.
  chrono::Duration::hours(24)
}

#[cfg(test)]
mod tests {
  use super::*;
  use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
  use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

  fn job_with(
    name: &str,
    created_secs: i64,
    complete: bool,
    failed: bool,
    start_secs: i64,
    completion_secs: i64,
  ) -> Job {
    let mut conditions = vec![];
    if complete {
      conditions.push(JobCondition {
        type_: "Complete".to_string(),
        status: "True".to_string(),
        message: None,
        ..Default::default()
      });
    }
    if failed {
      conditions.push(JobCondition {
        type_: "Failed".to_string(),
        status: "True".to_string(),
        message: Some("image pull failed".to_string()),
        ..Default::default()
      });
    }
    Job {
      metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        name: Some(name.to_string()),
        creation_timestamp: Some(Time(
          DateTime::from_timestamp(created_secs, 0).unwrap(),
        )),
        ..Default::default()
      },
      status: Some(JobStatus {
        conditions: Some(conditions),
        start_time: Some(Time(
          DateTime::from_timestamp(start_secs, 0).unwrap(),
        )),
        completion_time: Some(Time(
          DateTime::from_timestamp(completion_secs, 0).unwrap(),
        )),
        ..Default::default()
      }),
      spec: None,
    }
  }

  #[test]
  fn counts_only_failures_before_first_success() {
    // Reverse-chronological: newest first.
    let jobs = vec![
      job_with("job-3", 300, true, false, 290, 300),
      job_with("job-2", 200, false, true, 190, 200),
      job_with("job-1", 100, false, true, 90, 100),
    ];
    let report = analyze_jobs(&jobs);
    assert_eq!(report.failures_since_last_success, 2);
    assert!(report.last_successful_time.is_some());
  }

  #[test]
  fn jobs_without_completion_are_ignored() {
    let mut incomplete = job_with("job-0", 50, false, false, 0, 0);
    incomplete.status = Some(JobStatus::default());
    let jobs = vec![incomplete];
    let report = analyze_jobs(&jobs);
    assert_eq!(report.failures_since_last_success, 0);
    assert!(report.last_successful_time.is_none());
  }

  #[test]
  fn emit_status_telemetry_records_duration_and_last_run() {
    let (telemetry, _registry) = telemetry::Telemetry::new();
    let report = StatusReport {
      configured: true,
      last_successful_time: DateTime::from_timestamp(1000, 0),
      last_duration: Some("42s".to_string()),
      ..Default::default()
    };
    emit_status_telemetry(
      &telemetry,
      "komodo-maintenance",
      "komodo-maint-abc123",
      "repo-creds".to_string(),
      &report,
    );
    let labels = OperationLabels::new(
      "komodo-maint-abc123",
      "komodo-maintenance",
      Operation::Observed,
      "repo-creds",
    );
    assert_eq!(
      telemetry
        .maintenance_job_last_run_timestamp
        .get_or_create(&labels)
        .get(),
      1000
    );
  }

  #[test]
  fn last_duration_is_rendered_in_seconds() {
    let jobs = vec![job_with("job-1", 100, true, false, 90, 140)];
    let report = analyze_jobs(&jobs);
    assert_eq!(report.last_duration.as_deref(), Some("50s"));
  }

  #[test]
  fn last_error_comes_from_the_failed_condition_message() {
    let jobs = vec![job_with("job-1", 100, false, true, 90, 100)];
    let report = analyze_jobs(&jobs);
    assert_eq!(
      report.last_error.as_deref(),
      Some("image pull failed")
    );
  }

  #[test]
  fn coarse_interval_maps_daily_schedule_to_24h() {
    let from = DateTime::from_timestamp(0, 0).unwrap();
    assert_eq!(
      coarse_interval("0 2 * * *", from),
      chrono::Duration::hours(24)
    );
  }

  #[test]
  fn coarse_interval_maps_weekly_schedule_to_7d() {
    let from = DateTime::from_timestamp(0, 0).unwrap();
    assert_eq!(
      coarse_interval("0 3 * * 0", from),
      chrono::Duration::days(7)
    );
  }
}
