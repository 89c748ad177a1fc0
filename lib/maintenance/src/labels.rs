//! Stable label/annotation key namespace. Every cluster object this
//! crate produces carries a subset of these.

pub const DOMAIN: &str = "maintenance.komodo.dev";

pub const LABEL_MARKER: &str = "maintenance.komodo.dev/managed";
pub const LABEL_FINGERPRINT: &str = "maintenance.komodo.dev/fingerprint";
pub const LABEL_SOURCE_NAMESPACE: &str =
  "maintenance.komodo.dev/source-namespace";
pub const LABEL_MIRROR_MARKER: &str = "maintenance.komodo.dev/mirror";

pub const ANNOTATION_REPOSITORY: &str =
  "maintenance.komodo.dev/repository";
pub const ANNOTATION_SOURCE_NAMESPACE: &str =
  "maintenance.komodo.dev/source-namespace";
pub const ANNOTATION_SOURCE_SECRET: &str =
  "maintenance.komodo.dev/source-secret";
pub const ANNOTATION_CONFLICT: &str = "maintenance.komodo.dev/conflict";
pub const ANNOTATION_CREATED_BY: &str =
  "maintenance.komodo.dev/created-by";

pub const CREATED_BY_VALUE: &str = "komodo-maintenance-manager";
