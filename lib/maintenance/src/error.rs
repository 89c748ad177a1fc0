//! Error taxonomy for the maintenance core. Benign cluster outcomes
//! (already-exists on create, not-found on delete) are never constructed
//! as errors here - callers absorb them into `Ok` at the point of
//! occurrence instead of threading a "this was actually fine" variant
//! through the type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintenanceError {
  /// Partial identity, invalid compression, malformed policy JSON, or an
  /// empty required field. Returned synchronously before any cluster
  /// write.
  #[error("configuration error: {0}")]
  Config(String),

  /// Any cluster read/write failure other than not-found-on-delete or
  /// already-exists-on-create. Always retryable.
  #[error("cluster error: {0}")]
  Cluster(#[from] kube::Error),

  #[error(transparent)]
  Identity(#[from] identity::IdentityError),

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl MaintenanceError {
  pub fn config(msg: impl Into<String>) -> Self {
    Self::Config(msg.into())
  }
}

/// True when a `kube::Error` represents an HTTP 409 Conflict due to the
/// object already existing - benign on create.
pub fn is_already_exists(err: &kube::Error) -> bool {
  matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

/// True when a `kube::Error` represents an HTTP 404 Not Found - benign
/// on delete, and benign on a best-effort lookup.
pub fn is_not_found(err: &kube::Error) -> bool {
  matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
