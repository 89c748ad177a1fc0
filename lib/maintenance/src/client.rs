//! Thin per-resource-type `kube::Api` accessors: one function per kind,
//! rather than a generic CRUD abstraction over `Resource`.

use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{Api, Client};

pub fn secrets(client: &Client, namespace: &str) -> Api<Secret> {
  Api::namespaced(client.clone(), namespace)
}

pub fn scheduled_tasks(
  client: &Client,
  namespace: &str,
) -> Api<CronJob> {
  Api::namespaced(client.clone(), namespace)
}

pub fn jobs(client: &Client, namespace: &str) -> Api<Job> {
  Api::namespaced(client.clone(), namespace)
}

pub fn service_accounts(
  client: &Client,
  namespace: &str,
) -> Api<ServiceAccount> {
  Api::namespaced(client.clone(), namespace)
}

pub fn roles(client: &Client, namespace: &str) -> Api<Role> {
  Api::namespaced(client.clone(), namespace)
}

pub fn role_bindings(
  client: &Client,
  namespace: &str,
) -> Api<RoleBinding> {
  Api::namespaced(client.clone(), namespace)
}
