//! Builds the `CronJob` (and its pod template) that runs an engine's
//! maintenance command against one repository on a schedule.

use std::collections::BTreeMap;

use fingerprint::CustomCaRef;
use k8s_openapi::api::batch::v1::{
  CronJob, CronJobSpec, JobSpec, JobTemplateSpec,
};
use k8s_openapi::api::core::v1::{
  Capabilities, ConfigMapVolumeSource, Container, EmptyDirVolumeSource,
  EnvFromSource, EnvVar, PodSecurityContext, PodSpec, PodTemplateSpec,
  SecretEnvSource, SecretVolumeSource, SecurityContext, Volume,
  VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::context::BuilderConfig;
use crate::labels;

const DIRECTION_ENV: &str = "DIRECTION";
const CACHE_DIR_ENV: &str = "KOPIA_CACHE_DIR";
const DATA_DIR_ENV: &str = "DATA_DIR";
const OVERRIDE_USERNAME_ENV: &str = "KOPIA_OVERRIDE_USERNAME";
const CUSTOM_CA_ENV: &str = "CUSTOM_CA";

const CACHE_DIR: &str = "/cache";
const DATA_DIR: &str = "/data";
const TMP_DIR: &str = "/tmp";
const CA_DIR: &str = "/customca";

/// Everything needed to build the desired object for one fingerprint.
/// `schedule` is already resolved: the reconciler substitutes the default
/// schedule upstream when the source didn't request one.
pub struct TaskSpecInput<'a> {
  pub fingerprint: &'a str,
  pub tenant_namespace: &'a str,
  pub secret_ref: &'a str,
  pub mirrored_secret_name: &'a str,
  pub schedule: &'a str,
  pub custom_ca: Option<&'a CustomCaRef>,
}

/// Builds the complete desired `CronJob` for a repository configuration.
/// Name/namespace are not set here - callers (the reconciler) fill them
/// in once, since create and update share this builder but differ only
/// in metadata (resource version, existing labels).
pub fn build_scheduled_task(
  operator_namespace: &str,
  builder: &BuilderConfig,
  input: &TaskSpecInput,
) -> CronJob {
  CronJob {
    metadata: ObjectMeta {
      labels: Some(task_labels(
        input.fingerprint,
        input.tenant_namespace,
      )),
      annotations: Some(task_annotations(
        input.secret_ref,
        input.tenant_namespace,
      )),
      ..Default::default()
    },
    spec: Some(CronJobSpec {
      schedule: input.schedule.to_string(),
      concurrency_policy: Some("Forbid".to_string()),
      suspend: Some(builder.suspend),
      successful_jobs_history_limit: Some(
        builder.successful_jobs_history_limit,
      ),
      failed_jobs_history_limit: Some(
        builder.failed_jobs_history_limit,
      ),
      job_template: JobTemplateSpec {
        metadata: Some(ObjectMeta {
          labels: Some(task_labels(
            input.fingerprint,
            input.tenant_namespace,
          )),
          ..Default::default()
        }),
        spec: Some(JobSpec {
          template: pod_template(operator_namespace, builder, input),
          ..Default::default()
        }),
      },
      ..Default::default()
    }),
    status: None,
  }
}

fn pod_template(
  operator_namespace: &str,
  builder: &BuilderConfig,
  input: &TaskSpecInput,
) -> PodTemplateSpec {
  PodTemplateSpec {
    metadata: Some(ObjectMeta {
      labels: Some(task_labels(
        input.fingerprint,
        input.tenant_namespace,
      )),
      ..Default::default()
    }),
    spec: Some(PodSpec {
      restart_policy: Some("OnFailure".to_string()),
      service_account_name: Some(
        crate::principal::SERVICE_PRINCIPAL_NAME.to_string(),
      ),
      security_context: Some(PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(1000),
        fs_group: Some(1000),
        ..Default::default()
      }),
      containers: vec![container(operator_namespace, builder, input)],
      volumes: Some(volumes(input)),
      ..Default::default()
    }),
  }
}

fn container(
  operator_namespace: &str,
  builder: &BuilderConfig,
  input: &TaskSpecInput,
) -> Container {
  Container {
    name: "maintenance".to_string(),
    image: Some(builder.image.clone()),
    env: Some(env_vars(operator_namespace, input)),
    env_from: Some(vec![EnvFromSource {
      secret_ref: Some(SecretEnvSource {
        name: input.mirrored_secret_name.to_string(),
        optional: Some(false),
      }),
      ..Default::default()
    }]),
    volume_mounts: Some(volume_mounts(input)),
    security_context: Some(SecurityContext {
      read_only_root_filesystem: Some(true),
      allow_privilege_escalation: Some(false),
      run_as_non_root: Some(true),
      capabilities: Some(Capabilities {
        drop: Some(vec!["ALL".to_string()]),
        ..Default::default()
      }),
      ..Default::default()
    }),
    ..Default::default()
  }
}

fn env_vars(
  operator_namespace: &str,
  input: &TaskSpecInput,
) -> Vec<EnvVar> {
  let mut vars = vec![
    env(DIRECTION_ENV, "maintenance"),
    env(CACHE_DIR_ENV, CACHE_DIR),
    env(DATA_DIR_ENV, DATA_DIR),
    env(
      OVERRIDE_USERNAME_ENV,
      &format!("maintenance@{operator_namespace}"),
    ),
  ];
  if let Some(custom_ca) = input.custom_ca {
    let file = custom_ca_key(custom_ca);
    vars.push(env(
      CUSTOM_CA_ENV,
      &format!("{CA_DIR}/{file}"),
    ));
  }
  vars
}

fn custom_ca_key(custom_ca: &CustomCaRef) -> &str {
  match custom_ca {
    CustomCaRef::Secret { key, .. } => key,
    CustomCaRef::ConfigMap { key, .. } => key,
  }
}

fn env(name: &str, value: &str) -> EnvVar {
  EnvVar {
    name: name.to_string(),
    value: Some(value.to_string()),
    value_from: None,
  }
}

fn volumes(input: &TaskSpecInput) -> Vec<Volume> {
  let mut volumes = vec![
    Volume {
      name: "cache".to_string(),
      empty_dir: Some(EmptyDirVolumeSource {
        medium: Some("Memory".to_string()),
        size_limit: Some(Quantity("1Gi".to_string())),
      }),
      ..Default::default()
    },
    Volume {
      name: "tmp".to_string(),
      empty_dir: Some(EmptyDirVolumeSource {
        medium: Some("Memory".to_string()),
        size_limit: Some(Quantity("1Gi".to_string())),
      }),
      ..Default::default()
    },
  ];
  if let Some(custom_ca) = input.custom_ca {
    volumes.push(custom_ca_volume(custom_ca));
  }
  volumes
}

fn custom_ca_volume(custom_ca: &CustomCaRef) -> Volume {
  match custom_ca {
    CustomCaRef::Secret { name, .. } => Volume {
      name: "custom-ca".to_string(),
      secret: Some(SecretVolumeSource {
        secret_name: Some(name.clone()),
        ..Default::default()
      }),
      ..Default::default()
    },
    CustomCaRef::ConfigMap { name, .. } => Volume {
      name: "custom-ca".to_string(),
      config_map: Some(ConfigMapVolumeSource {
        name: name.clone(),
        ..Default::default()
      }),
      ..Default::default()
    },
  }
}

fn volume_mounts(input: &TaskSpecInput) -> Vec<VolumeMount> {
  let mut mounts = vec![
    VolumeMount {
      name: "cache".to_string(),
      mount_path: CACHE_DIR.to_string(),
      ..Default::default()
    },
    VolumeMount {
      name: "tmp".to_string(),
      mount_path: TMP_DIR.to_string(),
      ..Default::default()
    },
  ];
  if input.custom_ca.is_some() {
    mounts.push(VolumeMount {
      name: "custom-ca".to_string(),
      mount_path: CA_DIR.to_string(),
      read_only: Some(true),
      ..Default::default()
    });
  }
  mounts
}

fn task_labels(
  fingerprint: &str,
  tenant_namespace: &str,
) -> BTreeMap<String, String> {
  BTreeMap::from([
    (labels::LABEL_MARKER.to_string(), "true".to_string()),
    (
      labels::LABEL_FINGERPRINT.to_string(),
      fingerprint.to_string(),
    ),
    (
      labels::LABEL_SOURCE_NAMESPACE.to_string(),
      tenant_namespace.to_string(),
    ),
  ])
}

fn task_annotations(
  secret_ref: &str,
  tenant_namespace: &str,
) -> BTreeMap<String, String> {
  BTreeMap::from([
    (
      labels::ANNOTATION_REPOSITORY.to_string(),
      secret_ref.to_string(),
    ),
    (
      labels::ANNOTATION_SOURCE_NAMESPACE.to_string(),
      tenant_namespace.to_string(),
    ),
  ])
}
