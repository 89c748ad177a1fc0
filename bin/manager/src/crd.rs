//! Narrow consuming view of the replication-source custom resource.
//!
//! The CRD's full type definition and validation webhook belong to the
//! owning custom-resource package and are out of scope here. This module
//! defines only the `spec.kopia` fields the maintenance core actually
//! reads, wide enough to compile and watch against a real cluster
//! without re-specifying the whole resource.

use fingerprint::CustomCaRef;
use kube::CustomResource;
use maintenance::source::{
  KopiaSourceSpec, MaintenanceEnablement, ReplicationSourceInput,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
  CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema,
)]
#[kube(
  group = "volsync.backube",
  version = "v1alpha1",
  kind = "ReplicationSource",
  namespaced,
  status = "ReplicationSourceStatus",
  shortname = "rs"
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSourceSpec {
  /// Name of the PVC this source backs up. Not consumed by the
  /// maintenance core (PVC names are ignored by hostname derivation) but
  /// kept on the type since it is part of the real resource shape.
  #[serde(default)]
  pub source_pvc: Option<String>,
  #[serde(default)]
  pub paused: bool,
  #[serde(default)]
  pub kopia: Option<KopiaSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KopiaSpec {
  pub repository: String,
  #[serde(default)]
  pub custom_ca: Option<CustomCaSpec>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub hostname: Option<String>,
  #[serde(default)]
  pub compression: Option<String>,
  #[serde(default)]
  pub additional_args: Vec<String>,
  #[serde(default)]
  pub policy_config: Option<PolicyConfig>,
  /// Authoritative source of the requested maintenance schedule (see
  /// `DESIGN.md` for the recorded decision). A dedicated maintenance
  /// custom resource may supersede this field in a future revision of
  /// the owning operator without affecting `lib/maintenance`, which
  /// only ever sees the already-resolved `MaintenanceEnablement`.
  #[serde(default)]
  pub maintenance_schedule: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", untagged)]
pub enum CustomCaSpec {
  Secret { secret_name: String, key: String },
  ConfigMap { config_map_name: String, key: String },
}

impl From<CustomCaSpec> for CustomCaRef {
  fn from(spec: CustomCaSpec) -> Self {
    match spec {
      CustomCaSpec::Secret { secret_name, key } => {
        CustomCaRef::Secret { name: secret_name, key }
      }
      CustomCaSpec::ConfigMap { config_map_name, key } => {
        CustomCaRef::ConfigMap { name: config_map_name, key }
      }
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
  #[serde(default)]
  pub repository_config: Option<String>,
}

#[derive(
  Debug, Clone, Default, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSourceStatus {
  #[serde(default)]
  pub conditions: Vec<StatusCondition>,
}

/// Minimal standalone mirror of `meta/v1.Condition`'s shape. Defined
/// locally (rather than reused from `k8s_openapi`) so the status type
/// doesn't need the `schemars` feature enabled on `k8s-openapi` for a
/// field this crate never reads.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
  #[serde(rename = "type")]
  pub type_: String,
  pub status: String,
  #[serde(default)]
  pub reason: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

/// Converts the watched custom resource into the contract boundary
/// `lib/maintenance` consumes.
///
/// Enablement decision (recorded in `DESIGN.md`): maintenance is enabled
/// whenever `spec.kopia` is configured and the source is not paused; the
/// requested schedule is read from `spec.kopia.maintenanceSchedule` when
/// present.
pub fn to_source_input(
  source: &ReplicationSource,
) -> ReplicationSourceInput {
  let name = source.metadata.name.clone().unwrap_or_default();
  let namespace = source.metadata.namespace.clone().unwrap_or_default();

  let kopia = source.spec.kopia.as_ref().map(|k| KopiaSourceSpec {
    repository: k.repository.clone(),
    custom_ca: k.custom_ca.clone().map(CustomCaRef::from),
    username: k.username.clone(),
    hostname: k.hostname.clone(),
    compression: k.compression.clone(),
    additional_args: k.additional_args.clone(),
    policy_config: k
      .policy_config
      .as_ref()
      .and_then(|p| p.repository_config.clone()),
  });

  let maintenance = if source.spec.paused || kopia.is_none() {
    MaintenanceEnablement::Disabled
  } else {
    MaintenanceEnablement::Enabled {
      schedule: source
        .spec
        .kopia
        .as_ref()
        .and_then(|k| k.maintenance_schedule.clone()),
    }
  };

  ReplicationSourceInput { name, namespace, kopia, maintenance }
}

#[cfg(test)]
mod tests {
  use super::*;
  use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

  fn source(paused: bool, kopia: Option<KopiaSpec>) -> ReplicationSource {
    ReplicationSource {
      metadata: ObjectMeta {
        name: Some("app".to_string()),
        namespace: Some("team-a".to_string()),
        ..Default::default()
      },
      spec: ReplicationSourceSpec {
        source_pvc: Some("app-data".to_string()),
        paused,
        kopia,
      },
      status: None,
    }
  }

  fn kopia_spec() -> KopiaSpec {
    KopiaSpec {
      repository: "repo-creds".to_string(),
      custom_ca: None,
      username: None,
      hostname: None,
      compression: None,
      additional_args: vec![],
      policy_config: None,
      maintenance_schedule: Some("0 1 * * *".to_string()),
    }
  }

  #[test]
  fn paused_source_is_never_enabled() {
    let input = to_source_input(&source(true, Some(kopia_spec())));
    assert!(!input.maintenance.is_enabled());
  }

  #[test]
  fn source_without_kopia_is_never_enabled() {
    let input = to_source_input(&source(false, None));
    assert!(!input.maintenance.is_enabled());
  }

  #[test]
  fn active_kopia_source_is_enabled_with_its_schedule() {
    let input = to_source_input(&source(false, Some(kopia_spec())));
    assert!(input.maintenance.is_enabled());
    assert_eq!(
      input.maintenance.requested_schedule(),
      Some("0 1 * * *")
    );
  }
}
