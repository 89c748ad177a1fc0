//! Cluster-object name derivation for scheduled tasks and mirrored
//! secrets.

/// Hard name-length ceilings used by Kubernetes object names.
pub const MAX_TASK_NAME_LEN: usize = 52;
pub const MAX_SECRET_NAME_LEN: usize = 63;

pub const TASK_NAME_PREFIX: &str = "komodo-maint";

/// `"<prefix>-<F>"`, truncated to [`MAX_TASK_NAME_LEN`].
pub fn scheduled_task_name(fingerprint: &str) -> String {
  let full = format!("{TASK_NAME_PREFIX}-{fingerprint}");
  truncate_chars(&full, MAX_TASK_NAME_LEN)
}

/// `"maintenance-<tenantNamespace>-<secretRef>"`, truncated and suffixed
/// with the fingerprint when it would exceed [`MAX_SECRET_NAME_LEN`].
pub fn mirrored_secret_name(
  tenant_namespace: &str,
  secret_ref: &str,
  fingerprint: &str,
) -> String {
  let full =
    format!("maintenance-{tenant_namespace}-{secret_ref}");
  if full.chars().count() <= MAX_SECRET_NAME_LEN {
    return full;
  }
  // budget = 63 - len(F) - 1, then append "-F".
  let budget =
    MAX_SECRET_NAME_LEN.saturating_sub(fingerprint.chars().count() + 1);
  format!("{}-{fingerprint}", truncate_chars(&full, budget))
}

fn truncate_chars(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    s.chars().take(max).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn task_name_is_not_truncated_when_short() {
    let name = scheduled_task_name("abc123def4567890");
    assert_eq!(name, "komodo-maint-abc123def4567890");
    assert!(name.len() <= MAX_TASK_NAME_LEN);
  }

  #[test]
  fn secret_name_passes_through_when_short() {
    let name = mirrored_secret_name("team-a", "repo-creds", "F");
    assert_eq!(name, "maintenance-team-a-repo-creds");
  }

  #[test]
  fn secret_name_truncates_and_suffixes_when_long() {
    let tenant = "a-very-long-tenant-namespace-name-that-pushes-past-sixty-three";
    let fingerprint = "0123456789abcdef";
    let name =
      mirrored_secret_name(tenant, "repo-creds-long-ref", fingerprint);
    assert!(name.len() <= MAX_SECRET_NAME_LEN);
    assert!(name.ends_with(&format!("-{fingerprint}")));
  }
}
