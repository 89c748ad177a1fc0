//! Creates the service account, role, and role binding the maintenance
//! scheduled tasks run as. Idempotent: already-exists is benign and
//! logged at verbose level, everything else is fatal.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
  PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;

use crate::context::MaintenanceContext;
use crate::error::{is_already_exists, MaintenanceError};
use crate::labels;

pub const SERVICE_PRINCIPAL_NAME: &str = "komodo-maintenance";

/// Ensures the operator-namespace service account, its read/list Role
/// over secrets and config-maps, and the binding between them all exist.
pub async fn ensure_service_principal(
  ctx: &MaintenanceContext,
) -> Result<(), MaintenanceError> {
  create_if_absent(
    crate::client::service_accounts(
      &ctx.client,
      &ctx.operator_namespace,
    ),
    service_account(&ctx.operator_namespace),
  )
  .await?;

  create_if_absent(
    crate::client::roles(&ctx.client, &ctx.operator_namespace),
    role(&ctx.operator_namespace),
  )
  .await?;

  create_if_absent(
    crate::client::role_bindings(
      &ctx.client,
      &ctx.operator_namespace,
    ),
    role_binding(&ctx.operator_namespace),
  )
  .await?;

  Ok(())
}

async fn create_if_absent<K>(
  api: kube::Api<K>,
  object: K,
) -> Result<(), MaintenanceError>
where
  K: kube::Resource
    + Clone
    + std::fmt::Debug
    + serde::de::DeserializeOwned
    + serde::Serialize,
{
  let name = object
    .meta()
    .name
    .clone()
    .expect("bootstrap objects are always named");
  match api.create(&PostParams::default(), &object).await {
    Ok(_) => {
      tracing::info!(name, "created service-principal object");
      Ok(())
    }
    Err(e) if is_already_exists(&e) => {
      tracing::debug!(
        name,
        "service-principal object already existed"
      );
      Ok(())
    }
    Err(e) => Err(MaintenanceError::Cluster(e)),
  }
}

fn base_metadata(operator_namespace: &str) -> ObjectMeta {
  ObjectMeta {
    name: Some(SERVICE_PRINCIPAL_NAME.to_string()),
    namespace: Some(operator_namespace.to_string()),
    labels: Some(BTreeMap::from([(
      labels::LABEL_MARKER.to_string(),
      "true".to_string(),
    )])),
    ..Default::default()
  }
}

fn service_account(operator_namespace: &str) -> ServiceAccount {
  ServiceAccount {
    metadata: base_metadata(operator_namespace),
    ..Default::default()
  }
}

fn role(operator_namespace: &str) -> Role {
  Role {
    metadata: base_metadata(operator_namespace),
    rules: Some(vec![PolicyRule {
      api_groups: Some(vec!["".to_string()]),
      resources: Some(vec![
        "secrets".to_string(),
        "configmaps".to_string(),
      ]),
      verbs: vec!["get".to_string(), "list".to_string()],
      ..Default::default()
    }]),
  }
}

fn role_binding(operator_namespace: &str) -> RoleBinding {
  RoleBinding {
    metadata: base_metadata(operator_namespace),
    role_ref: RoleRef {
      api_group: "rbac.authorization.k8s.io".to_string(),
      kind: "Role".to_string(),
      name: SERVICE_PRINCIPAL_NAME.to_string(),
    },
    subjects: Some(vec![Subject {
      kind: "ServiceAccount".to_string(),
      name: SERVICE_PRINCIPAL_NAME.to_string(),
      namespace: Some(operator_namespace.to_string()),
      ..Default::default()
    }]),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn role_grants_only_get_and_list() {
    let role = role("komodo-maintenance");
    let rule = &role.rules.unwrap()[0];
    assert_eq!(rule.verbs, vec!["get", "list"]);
    assert_eq!(
      rule.resources.as_ref().unwrap(),
      &vec!["secrets".to_string(), "configmaps".to_string()]
    );
  }

  #[test]
  fn role_binding_references_the_role_and_account() {
    let binding = role_binding("komodo-maintenance");
    assert_eq!(binding.role_ref.name, SERVICE_PRINCIPAL_NAME);
    assert_eq!(
      binding.subjects.unwrap()[0].name,
      SERVICE_PRINCIPAL_NAME
    );
  }
}
