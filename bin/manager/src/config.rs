//! Controller configuration: environment-driven, assembled once into a
//! process-wide singleton on first access.

use std::sync::OnceLock;

use logger::LogConfig;
use maintenance::context::BuilderConfig;
use serde::{Deserialize, Serialize};

const POD_NAMESPACE_FILE: &str =
  "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const DEFAULT_OPERATOR_NAMESPACE: &str = "volsync-system";
const DEFAULT_IMAGE: &str = "ghcr.io/komodo/maintenance-mover:latest";
const DEFAULT_SCHEDULE: &str = "0 2 * * *";
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Flat environment-variable view, deserialized by `envy`. Every field
/// is optional so an unset variable falls back to `ManagerConfig`'s own
/// default rather than failing startup.
#[derive(Debug, Clone, Default, Deserialize)]
struct Env {
  pod_namespace: Option<String>,
  maintenance_image: Option<String>,
  maintenance_default_schedule: Option<String>,
  maintenance_successful_jobs_history_limit: Option<i32>,
  maintenance_failed_jobs_history_limit: Option<i32>,
  maintenance_suspend: Option<bool>,
  maintenance_sweep_interval_seconds: Option<u64>,

  #[serde(default)]
  logging_level: Option<logger::LogLevel>,
  #[serde(default)]
  logging_stdio: Option<logger::StdioLogMode>,
  #[serde(default)]
  logging_pretty: Option<bool>,
  #[serde(default)]
  logging_location: Option<bool>,
  #[serde(default)]
  logging_ansi: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerConfig {
  /// Resolved from the `POD_NAMESPACE` env var, then the in-pod
  /// namespace file, then a hard-coded default.
  pub operator_namespace: String,
  pub builder: BuilderConfigOwned,
  /// How often the namespace-level garbage-collection sweep runs.
  pub sweep_interval_seconds: u64,
  pub logging: LogConfig,
}

/// Plain serializable mirror of [`BuilderConfig`] so `ManagerConfig` can
/// derive `Serialize` for a startup debug dump without requiring
/// `maintenance::context::BuilderConfig` to do so itself.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderConfigOwned {
  pub image: String,
  pub default_schedule: String,
  pub successful_jobs_history_limit: i32,
  pub failed_jobs_history_limit: i32,
  pub suspend: bool,
}

impl From<&BuilderConfigOwned> for BuilderConfig {
  fn from(cfg: &BuilderConfigOwned) -> Self {
    BuilderConfig {
      image: cfg.image.clone(),
      default_schedule: cfg.default_schedule.clone(),
      successful_jobs_history_limit: cfg
        .successful_jobs_history_limit,
      failed_jobs_history_limit: cfg.failed_jobs_history_limit,
      suspend: cfg.suspend,
    }
  }
}

/// Resolves the operator namespace, falling back through the env var,
/// the in-pod namespace file, and finally a hard-coded default.
fn resolve_operator_namespace(env: &Env) -> String {
  if let Some(ns) = &env.pod_namespace {
    if !ns.is_empty() {
      return ns.clone();
    }
  }
  if let Ok(ns) = std::fs::read_to_string(POD_NAMESPACE_FILE) {
    let ns = ns.trim();
    if !ns.is_empty() {
      return ns.to_string();
    }
  }
  DEFAULT_OPERATOR_NAMESPACE.to_string()
}

/// Parses the process environment into a [`ManagerConfig`]. Loads a
/// `.env` file first (best-effort, ignored if absent) so local
/// development doesn't require exporting every variable by hand.
fn load() -> ManagerConfig {
  let _ = dotenvy::dotenv();
  let env: Env = envy::from_env().unwrap_or_else(|e| {
    panic!("failed to parse maintenance-manager environment: {e:?}")
  });

  ManagerConfig {
    operator_namespace: resolve_operator_namespace(&env),
    builder: BuilderConfigOwned {
      image: env
        .maintenance_image
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
      default_schedule: env
        .maintenance_default_schedule
        .clone()
        .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
      successful_jobs_history_limit: env
        .maintenance_successful_jobs_history_limit
        .unwrap_or(3),
      failed_jobs_history_limit: env
        .maintenance_failed_jobs_history_limit
        .unwrap_or(1),
      suspend: env.maintenance_suspend.unwrap_or(false),
    },
    sweep_interval_seconds: env
      .maintenance_sweep_interval_seconds
      .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS),
    logging: LogConfig {
      level: env.logging_level.unwrap_or_default(),
      stdio: env.logging_stdio.unwrap_or_default(),
      pretty: env.logging_pretty.unwrap_or(false),
      location: env.logging_location.unwrap_or(false),
      ansi: env.logging_ansi.unwrap_or(true),
    },
  }
}

/// Process-wide configuration singleton, parsed exactly once on first
/// access.
pub fn config() -> &'static ManagerConfig {
  static CONFIG: OnceLock<ManagerConfig> = OnceLock::new();
  CONFIG.get_or_init(load)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn falls_back_to_hard_coded_namespace_when_nothing_else_is_set() {
    let env = Env::default();
    assert_eq!(
      resolve_operator_namespace(&env),
      DEFAULT_OPERATOR_NAMESPACE
    );
  }

  #[test]
  fn pod_namespace_env_var_wins_when_present() {
    let env = Env {
      pod_namespace: Some("team-operator".to_string()),
      ..Default::default()
    };
    assert_eq!(resolve_operator_namespace(&env), "team-operator");
  }
}
