//! Explicit dependency bundle. Every reconciler/GC/status entry point
//! takes a `&MaintenanceContext` instead of reaching for a process-wide
//! static, so tests can construct a fresh one per case.

use std::sync::Arc;

use async_trait::async_trait;
use cache::SharedCache;
use kube::Client;
use telemetry::Telemetry;

use crate::source::ReplicationSourceInput;

/// Key under which `gc::sweep` caches one cluster-wide source listing per
/// garbage-collection tick (see [`MaintenanceContext::claims_cache`]).
pub const ALL_SOURCES_CACHE_KEY: &str = "__all__";

/// Builder defaults for the scheduled task. Kept separate from
/// `MaintenanceContext` itself so a single struct can be constructed
/// once from configuration and cloned cheaply.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
  pub image: String,
  pub default_schedule: String,
  pub successful_jobs_history_limit: i32,
  pub failed_jobs_history_limit: i32,
  pub suspend: bool,
}

impl Default for BuilderConfig {
  fn default() -> Self {
    Self {
      image: "ghcr.io/komodo/maintenance-mover:latest".to_string(),
      default_schedule: "0 2 * * *".to_string(),
      successful_jobs_history_limit: 3,
      failed_jobs_history_limit: 1,
      suspend: false,
    }
  }
}

/// Enumerates replication sources. The owning custom-resource type lives
/// outside this crate; this trait is the seam the garbage collector and
/// reconciler use to see sources anyway, and the seam tests substitute a
/// fake for.
#[async_trait]
pub trait SourceLister: Send + Sync {
  async fn list_namespace(
    &self,
    namespace: &str,
  ) -> anyhow::Result<Vec<ReplicationSourceInput>>;

  async fn list_all(&self)
  -> anyhow::Result<Vec<ReplicationSourceInput>>;
}

#[derive(Clone)]
pub struct MaintenanceContext {
  pub client: Client,
  pub operator_namespace: String,
  pub builder: BuilderConfig,
  pub telemetry: Arc<Telemetry>,
  pub sources: Arc<dyn SourceLister>,
  /// Cluster-wide source listing, memoized for the span of one garbage-
  /// collection tick so sweeping N tenant namespaces costs one cross-
  /// namespace list instead of N+1. The GC loop reseeds this key at the
  /// start of every tick; nothing else reads or writes it, so the
  /// per-source reconcile path stays fully live as before.
  pub claims_cache: SharedCache<String, Vec<ReplicationSourceInput>>,
}

impl MaintenanceContext {
  pub fn new(
    client: Client,
    operator_namespace: impl Into<String>,
    builder: BuilderConfig,
    telemetry: Arc<Telemetry>,
    sources: Arc<dyn SourceLister>,
  ) -> Self {
    Self {
      client,
      operator_namespace: operator_namespace.into(),
      builder,
      telemetry,
      sources,
      claims_cache: Arc::new(cache::CloneCache::default()),
    }
  }
}
