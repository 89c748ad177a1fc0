//! [`SourceLister`] implementation backed by a live cluster watch of
//! [`ReplicationSource`] objects.

use async_trait::async_trait;
use kube::api::ListParams;
use kube::{Api, Client};
use maintenance::context::SourceLister;
use maintenance::source::ReplicationSourceInput;

use crate::crd::{to_source_input, ReplicationSource};

pub struct KubeSourceLister {
  client: Client,
}

impl KubeSourceLister {
  pub fn new(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl SourceLister for KubeSourceLister {
  async fn list_namespace(
    &self,
    namespace: &str,
  ) -> anyhow::Result<Vec<ReplicationSourceInput>> {
    let api: Api<ReplicationSource> =
      Api::namespaced(self.client.clone(), namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list.items.iter().map(to_source_input).collect())
  }

  async fn list_all(
    &self,
  ) -> anyhow::Result<Vec<ReplicationSourceInput>> {
    let api: Api<ReplicationSource> = Api::all(self.client.clone());
    let list = api.list(&ListParams::default()).await?;
    Ok(list.items.iter().map(to_source_input).collect())
  }
}
