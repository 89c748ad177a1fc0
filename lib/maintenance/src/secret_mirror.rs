//! Copies a tenant's repository secret into the operator namespace so the
//! scheduled task can mount it without being granted read access across
//! tenant namespaces.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::Api;
use std::collections::BTreeMap;

use crate::context::MaintenanceContext;
use crate::error::{is_already_exists, MaintenanceError};
use crate::labels;

/// Reads the tenant's repository secret and creates or refreshes its
/// mirror in the operator namespace, returning the mirrored secret's
/// name. A no-op once the mirror's data already matches the source.
pub async fn ensure_mirrored_secret(
  ctx: &MaintenanceContext,
  tenant_namespace: &str,
  secret_ref: &str,
  fingerprint: &str,
) -> Result<String, MaintenanceError> {
  let tenant_api: Api<Secret> =
    crate::client::secrets(&ctx.client, tenant_namespace);
  let tenant_secret =
    tenant_api.get(secret_ref).await.map_err(|e| {
      tracing::error!(
        namespace = tenant_namespace,
        secret = secret_ref,
        error = %e,
        "failed to read tenant secret"
      );
      MaintenanceError::Cluster(e)
    })?;

  let mirrored_name = crate::naming::mirrored_secret_name(
    tenant_namespace,
    secret_ref,
    fingerprint,
  );

  let operator_api: Api<Secret> =
    crate::client::secrets(&ctx.client, &ctx.operator_namespace);

  let mut desired = tenant_secret.clone();
  desired.metadata = ObjectMeta {
    name: Some(mirrored_name.clone()),
    namespace: Some(ctx.operator_namespace.clone()),
    labels: Some(mirror_labels(fingerprint, tenant_namespace)),
    annotations: Some(mirror_annotations(
      tenant_namespace,
      secret_ref,
    )),
    ..Default::default()
  };

  match operator_api.get_opt(&mirrored_name).await {
    Ok(Some(existing)) => {
      if !data_equal(&existing.data, &tenant_secret.data) {
        desired.metadata.resource_version =
          existing.metadata.resource_version.clone();
        operator_api
          .replace(&mirrored_name, &PostParams::default(), &desired)
          .await
          .map_err(MaintenanceError::Cluster)?;
        tracing::info!(
          secret = mirrored_name,
          "mirrored secret data refreshed from tenant secret"
        );
      }
    }
    Ok(None) => {
      match operator_api
        .create(&PostParams::default(), &desired)
        .await
      {
        Ok(_) => {
          tracing::info!(
            secret = mirrored_name,
            tenant = tenant_namespace,
            "created mirrored secret"
          );
        }
        Err(e) if is_already_exists(&e) => {
          tracing::debug!(
            secret = mirrored_name,
            "mirrored secret already existed on create"
          );
        }
        Err(e) => return Err(MaintenanceError::Cluster(e)),
      }
    }
    Err(e) => return Err(MaintenanceError::Cluster(e)),
  }

  Ok(mirrored_name)
}

fn data_equal(
  a: &Option<BTreeMap<String, k8s_openapi::ByteString>>,
  b: &Option<BTreeMap<String, k8s_openapi::ByteString>>,
) -> bool {
  a == b
}

fn mirror_labels(
  fingerprint: &str,
  tenant_namespace: &str,
) -> BTreeMap<String, String> {
  BTreeMap::from([
    (labels::LABEL_MIRROR_MARKER.to_string(), "true".to_string()),
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

fn mirror_annotations(
  tenant_namespace: &str,
  secret_ref: &str,
) -> BTreeMap<String, String> {
  BTreeMap::from([
    (
      labels::ANNOTATION_SOURCE_NAMESPACE.to_string(),
      tenant_namespace.to_string(),
    ),
    (
      labels::ANNOTATION_SOURCE_SECRET.to_string(),
      secret_ref.to_string(),
    ),
    (
      labels::ANNOTATION_CREATED_BY.to_string(),
      labels::CREATED_BY_VALUE.to_string(),
    ),
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn data_equal_treats_missing_maps_as_equal() {
    assert!(data_equal(&None, &None));
  }

  #[test]
  fn data_equal_detects_differing_values() {
    let mut a = BTreeMap::new();
    a.insert(
      "key".to_string(),
      k8s_openapi::ByteString(b"one".to_vec()),
    );
    let mut b = BTreeMap::new();
    b.insert(
      "key".to_string(),
      k8s_openapi::ByteString(b"two".to_vec()),
    );
    assert!(!data_equal(&Some(a), &Some(b)));
  }

  #[test]
  fn mirror_labels_carry_fingerprint_and_tenant() {
    let map = mirror_labels("abc123", "team-a");
    assert_eq!(
      map.get(labels::LABEL_FINGERPRINT).map(String::as_str),
      Some("abc123")
    );
    assert_eq!(
      map.get(labels::LABEL_SOURCE_NAMESPACE).map(String::as_str),
      Some("team-a")
    );
  }
}
