//! Engine snapshot identity derivation.
//!
//! The backup engine identifies a client by a `(username, hostname)` pair.
//! Sources write snapshots under that identity; destinations must compute
//! the exact same pair to find them again. Getting this wrong silently
//! breaks restores, so the rules here are deliberately strict and the PVC
//! name is never allowed to leak into the hostname.

use thiserror::Error;

/// Where a human can read about the identity override contract. Surfaced
/// in [`IdentityError`] so a misconfigured user has somewhere to go.
const IDENTITY_DOCS_URL: &str = "https://komo.do/docs/maintenance-identity";

/// Resolved engine identity for one source or destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub username: String,
  pub hostname: String,
}

/// An explicit `(username, hostname)` override, as configured directly on
/// a source or destination. Both fields are optional independently so that
/// "exactly one set" can be detected and rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplicitIdentity {
  pub username: Option<String>,
  pub hostname: Option<String>,
}

impl ExplicitIdentity {
  fn is_empty(&self) -> bool {
    self.username.is_none() && self.hostname.is_none()
  }

  fn is_complete(&self) -> bool {
    self.username.is_some() && self.hostname.is_some()
  }
}

/// A destination's reference back to the source whose identity it should
/// reuse, per `spec.kopia.sourceIdentity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentityRef {
  pub source_name: String,
  pub source_namespace: Option<String>,
  pub source_pvc_name: Option<String>,
  /// Carried through untouched; the identity deriver does not consume it.
  pub source_path_override: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
  #[error(
    "invalid identity configuration: missing '{missing}'\n\
     Either provide both 'username' and 'hostname', or omit both and rely on automatic namespace-based identity.\n\
     See {IDENTITY_DOCS_URL} for details."
  )]
  PartialIdentity { missing: &'static str },
}

/// Lowercases ASCII letters, keeps digits/dots/hyphens, maps underscores to
/// hyphens, drops everything else, then trims any leading/trailing
/// character that isn't alphanumeric. Empty input (or input that sanitizes
/// to nothing) returns the empty string.
pub fn sanitize(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  for c in input.chars() {
    match c {
      'a'..='z' | '0'..='9' | '.' | '-' => out.push(c),
      'A'..='Z' => out.push(c.to_ascii_lowercase()),
      '_' => out.push('-'),
      _ => {}
    }
  }
  out
    .trim_matches(|c: char| !c.is_ascii_alphanumeric())
    .to_string()
}

/// `"<objectName>-<namespace>"`, unsanitized beyond what the engine itself
/// requires.
pub fn username(object_name: &str, namespace: &str) -> String {
  format!("{object_name}-{namespace}")
}

/// Strict-policy hostname derivation.
///
/// 1. An explicit hostname, once sanitized, wins if non-empty.
/// 2. Otherwise the sanitized namespace wins if non-empty. The PVC name is
///    never consulted - two PVCs in the same namespace MUST resolve to the
///    same hostname.
/// 3. Otherwise the sanitized object name is used.
pub fn generate_hostname(
  explicit_hostname: Option<&str>,
  _pvc_name_ignored: Option<&str>,
  namespace: &str,
  object_name: &str,
) -> String {
  if let Some(explicit) = explicit_hostname {
    let sanitized = sanitize(explicit);
    if !sanitized.is_empty() {
      return sanitized;
    }
  }
  let sanitized_namespace = sanitize(namespace);
  if !sanitized_namespace.is_empty() {
    return sanitized_namespace;
  }
  sanitize(object_name)
}

fn validate_explicit(
  explicit: &ExplicitIdentity,
) -> Result<(), IdentityError> {
  if explicit.is_empty() || explicit.is_complete() {
    return Ok(());
  }
  let missing = if explicit.username.is_none() {
    "username"
  } else {
    "hostname"
  };
  Err(IdentityError::PartialIdentity { missing })
}

/// Computes the identity a source should use: an explicit pair if
/// complete, otherwise the automatic namespace-based identity.
pub fn derive_source_identity(
  explicit: &ExplicitIdentity,
  namespace: &str,
  object_name: &str,
) -> Result<Identity, IdentityError> {
  validate_explicit(explicit)?;
  if explicit.is_complete() {
    return Ok(Identity {
      username: explicit.username.clone().unwrap(),
      hostname: explicit.hostname.clone().unwrap(),
    });
  }
  Ok(Identity {
    username: username(object_name, namespace),
    hostname: generate_hostname(None, None, namespace, object_name),
  })
}

/// Computes the identity a destination should use to locate snapshots.
///
/// - A complete explicit `(username, hostname)` pair always wins, used
///   verbatim.
/// - Otherwise, if `sourceIdentity` is set, the destination recomputes the
///   identity as if it were the referenced source - same rules, same
///   namespace-priority policy, with `sourcePVCName` ignored exactly as it
///   would be at the source.
/// - Otherwise, the destination falls back to its own automatic
///   namespace-based identity.
pub fn derive_destination_identity(
  explicit: &ExplicitIdentity,
  source_identity: Option<&SourceIdentityRef>,
  destination_namespace: &str,
  destination_object_name: &str,
) -> Result<Identity, IdentityError> {
  validate_explicit(explicit)?;
  if explicit.is_complete() {
    return Ok(Identity {
      username: explicit.username.clone().unwrap(),
      hostname: explicit.hostname.clone().unwrap(),
    });
  }
  if let Some(source) = source_identity {
    let source_namespace = source
      .source_namespace
      .as_deref()
      .unwrap_or(destination_namespace);
    return Ok(Identity {
      username: username(&source.source_name, source_namespace),
      hostname: generate_hostname(
        None,
        source.source_pvc_name.as_deref(),
        source_namespace,
        &source.source_name,
      ),
    });
  }
  Ok(Identity {
    username: username(
      destination_object_name,
      destination_namespace,
    ),
    hostname: generate_hostname(
      None,
      None,
      destination_namespace,
      destination_object_name,
    ),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sanitize_lowercases_and_maps_underscore() {
    assert_eq!(sanitize("test_namespace"), "test-namespace");
  }

  #[test]
  fn sanitize_drops_unsupported_characters() {
    assert_eq!(sanitize("@#$%^&*()"), "");
  }

  #[test]
  fn sanitize_trims_non_alphanumeric_ends() {
    assert_eq!(sanitize("-.hello-.world-."), "hello-.world");
  }

  #[test]
  fn hostname_prefers_namespace_over_pvc() {
    assert_eq!(
      generate_hostname(
        None,
        Some("app-data"),
        "production",
        "backup-job"
      ),
      "production"
    );
  }

  #[test]
  fn hostname_sanitizes_underscore_namespace() {
    assert_eq!(
      generate_hostname(None, Some("data"), "test_namespace", "x"),
      "test-namespace"
    );
  }

  #[test]
  fn hostname_explicit_wins() {
    assert_eq!(
      generate_hostname(
        Some("my-custom"),
        Some("data"),
        "production",
        "backup-job"
      ),
      "my-custom"
    );
  }

  #[test]
  fn hostname_falls_back_to_object_name() {
    assert_eq!(
      generate_hostname(
        None,
        Some("data"),
        "@#$%^&*()",
        "backup-job"
      ),
      "backup-job"
    );
  }

  #[test]
  fn hostname_ignores_pvc_name_varying_with_fixed_namespace() {
    let a = generate_hostname(None, Some("pvc-one"), "ns", "obj");
    let b = generate_hostname(None, Some("pvc-two"), "ns", "obj");
    assert_eq!(a, b);
  }

  #[test]
  fn partial_identity_reports_missing_hostname() {
    let explicit = ExplicitIdentity {
      username: Some("u".into()),
      hostname: None,
    };
    let err = derive_destination_identity(&explicit, None, "ns", "obj")
      .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("missing 'hostname'"));
    assert!(msg.contains(
      "Either provide both 'username' and 'hostname', or omit both"
    ));
    assert!(msg.contains(IDENTITY_DOCS_URL));
  }

  #[test]
  fn partial_identity_reports_missing_username() {
    let explicit = ExplicitIdentity {
      username: None,
      hostname: Some("h".into()),
    };
    let err = derive_destination_identity(&explicit, None, "ns", "obj")
      .unwrap_err();
    assert!(err.to_string().contains("missing 'username'"));
  }

  #[test]
  fn complete_explicit_identity_used_verbatim_even_with_source_identity() {
    let explicit = ExplicitIdentity {
      username: Some("u".into()),
      hostname: Some("h".into()),
    };
    let source = SourceIdentityRef {
      source_name: "src".into(),
      source_namespace: Some("src-ns".into()),
      source_pvc_name: None,
      source_path_override: None,
    };
    let identity = derive_destination_identity(
      &explicit,
      Some(&source),
      "dst-ns",
      "dst-obj",
    )
    .unwrap();
    assert_eq!(identity.username, "u");
    assert_eq!(identity.hostname, "h");
  }

  #[test]
  fn destination_recomputes_source_identity() {
    let source = SourceIdentityRef {
      source_name: "app".into(),
      source_namespace: Some("team-a".into()),
      source_pvc_name: Some("data".into()),
      source_path_override: None,
    };
    let identity = derive_destination_identity(
      &ExplicitIdentity::default(),
      Some(&source),
      "restore-ns",
      "restore-obj",
    )
    .unwrap();
    assert_eq!(identity.username, "app-team-a");
    assert_eq!(identity.hostname, "team-a");
  }

  #[test]
  fn destination_falls_back_to_automatic_identity() {
    let identity = derive_destination_identity(
      &ExplicitIdentity::default(),
      None,
      "restore-ns",
      "restore-obj",
    )
    .unwrap();
    assert_eq!(identity.username, "restore-obj-restore-ns");
    assert_eq!(identity.hostname, "restore-ns");
  }
}
