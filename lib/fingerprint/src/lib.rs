//! Deterministic repository identity fingerprinting.
//!
//! A [`RepositoryConfig`] describes everything needed to reach a single
//! engine repository: which secret holds the credentials, which custom CA
//! (if any) to trust, and where (tenant namespace / requested schedule) the
//! request originated from. Only the first two are part of the repository's
//! *identity* - the fingerprint is intentionally blind to namespace and
//! schedule so that two tenants pointing at the same repository converge on
//! a single maintenance job.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of leading hex characters of the digest kept as the fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// A reference to a custom CA bundle, either mounted from a Secret or a
/// ConfigMap. Only one of the two variants may be configured at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomCaRef {
  Secret { name: String, key: String },
  ConfigMap { name: String, key: String },
}

/// The subset of a repository configuration that determines its identity.
/// Field order here is the canonical encoding order used by [`fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct FingerprintKey<'a> {
  secret_ref: &'a str,
  custom_ca: &'a Option<CustomCaRef>,
}

/// Everything the maintenance subsystem needs to know about one replication
/// source's backing repository.
///
/// `namespace` and `schedule` are carried for convenience by callers
/// (the secret mirror needs the tenant namespace, the task builder needs
/// the schedule) but are explicitly excluded from [`fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
  /// Name of the Secret in `namespace` holding repository credentials.
  pub secret_ref: String,
  /// Optional custom CA bundle to trust when connecting to the repository.
  pub custom_ca: Option<CustomCaRef>,
  /// Tenant namespace owning the replication source that produced this
  /// configuration.
  pub namespace: String,
  /// Requested cron schedule, if the source specified one.
  pub schedule: Option<String>,
}

/// Computes the 16-hex-character fingerprint `F` for a repository
/// configuration.
///
/// `F` is stable across process restarts, across reorderings of optional
/// fields (there are none left to reorder once `customCA`'s variant is
/// fixed), and independent of `namespace` / `schedule`. If canonical
/// serialization somehow fails, a deterministic string concatenation is
/// hashed instead so that a fingerprint is always produced.
pub fn fingerprint(config: &RepositoryConfig) -> String {
  let key = FingerprintKey {
    secret_ref: &config.secret_ref,
    custom_ca: &config.custom_ca,
  };
  let bytes = match serde_json::to_vec(&key) {
    Ok(bytes) => bytes,
    Err(_) => fallback_encoding(config).into_bytes(),
  };
  let digest = Sha256::digest(&bytes);
  let hex = hex::encode(digest);
  hex[..FINGERPRINT_LEN].to_string()
}

/// Deterministic fallback encoding used only if canonical serialization of
/// the fingerprint key fails.
fn fallback_encoding(config: &RepositoryConfig) -> String {
  let (ca_secret, ca_config_map) = match &config.custom_ca {
    Some(CustomCaRef::Secret { name, .. }) => (name.as_str(), ""),
    Some(CustomCaRef::ConfigMap { name, .. }) => ("", name.as_str()),
    None => ("", ""),
  };
  format!(
    "{}:ca-{}-{}",
    config.secret_ref, ca_secret, ca_config_map
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cfg(
    secret_ref: &str,
    custom_ca: Option<CustomCaRef>,
    namespace: &str,
    schedule: Option<&str>,
  ) -> RepositoryConfig {
    RepositoryConfig {
      secret_ref: secret_ref.to_string(),
      custom_ca,
      namespace: namespace.to_string(),
      schedule: schedule.map(str::to_string),
    }
  }

  #[test]
  fn is_stable_for_identical_inputs() {
    let a = cfg("repo-creds", None, "team-a", Some("0 1 * * *"));
    let b = cfg("repo-creds", None, "team-a", Some("0 1 * * *"));
    assert_eq!(fingerprint(&a), fingerprint(&b));
  }

  #[test]
  fn ignores_namespace_and_schedule() {
    let a = cfg("repo-creds", None, "team-a", Some("0 1 * * *"));
    let b = cfg("repo-creds", None, "team-b", Some("0 3 * * *"));
    assert_eq!(fingerprint(&a), fingerprint(&b));
  }

  #[test]
  fn differs_on_secret_ref() {
    let a = cfg("repo-creds", None, "team-a", None);
    let b = cfg("other-creds", None, "team-a", None);
    assert_ne!(fingerprint(&a), fingerprint(&b));
  }

  #[test]
  fn differs_on_custom_ca() {
    let a = cfg("repo-creds", None, "team-a", None);
    let b = cfg(
      "repo-creds",
      Some(CustomCaRef::Secret {
        name: "ca-secret".into(),
        key: "ca.crt".into(),
      }),
      "team-a",
      None,
    );
    assert_ne!(fingerprint(&a), fingerprint(&b));
  }

  #[test]
  fn distinguishes_secret_and_config_map_ca_with_same_name() {
    let a = cfg(
      "repo-creds",
      Some(CustomCaRef::Secret {
        name: "ca".into(),
        key: "ca.crt".into(),
      }),
      "team-a",
      None,
    );
    let b = cfg(
      "repo-creds",
      Some(CustomCaRef::ConfigMap {
        name: "ca".into(),
        key: "ca.crt".into(),
      }),
      "team-a",
      None,
    );
    assert_ne!(fingerprint(&a), fingerprint(&b));
  }

  #[test]
  fn produces_sixteen_hex_characters() {
    let a = cfg("repo-creds", None, "team-a", None);
    let f = fingerprint(&a);
    assert_eq!(f.len(), FINGERPRINT_LEN);
    assert!(f.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
