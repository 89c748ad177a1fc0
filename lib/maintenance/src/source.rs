//! Replication source/destination contract. The owning custom-resource
//! types stay out of scope; these structs are the boundary the
//! reconciler, identity deriver, and task builder actually consume.

use fingerprint::CustomCaRef;
use identity::SourceIdentityRef;

/// Whether maintenance is claimed for a source, and at what requested
/// schedule. The watching controller (out of scope here) is responsible
/// for populating this from whichever custom-resource field is
/// authoritative; the core only ever sees the resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceEnablement {
  Disabled,
  Enabled { schedule: Option<String> },
}

impl MaintenanceEnablement {
  pub fn is_enabled(&self) -> bool {
    matches!(self, Self::Enabled { .. })
  }

  pub fn requested_schedule(&self) -> Option<&str> {
    match self {
      Self::Enabled { schedule } => schedule.as_deref(),
      Self::Disabled => None,
    }
  }
}

/// The `kopia`-tagged variant of a replication source's engine spec.
/// Sources tagged with any other engine are out of scope: the core
/// returns early on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KopiaSourceSpec {
  pub repository: String,
  pub custom_ca: Option<CustomCaRef>,
  pub username: Option<String>,
  pub hostname: Option<String>,
  pub compression: Option<String>,
  pub additional_args: Vec<String>,
  pub policy_config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSourceInput {
  pub name: String,
  pub namespace: String,
  pub kopia: Option<KopiaSourceSpec>,
  pub maintenance: MaintenanceEnablement,
}

impl ReplicationSourceInput {
  /// A source is fit for reconciliation only with a non-empty name,
  /// namespace, and repository reference.
  pub fn has_required_fields(&self) -> bool {
    !self.name.is_empty()
      && !self.namespace.is_empty()
      && self
        .kopia
        .as_ref()
        .is_some_and(|k| !k.repository.is_empty())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KopiaDestinationSpec {
  pub repository: String,
  pub custom_ca: Option<CustomCaRef>,
  pub username: Option<String>,
  pub hostname: Option<String>,
  pub source_identity: Option<SourceIdentityRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationDestinationInput {
  pub name: String,
  pub namespace: String,
  pub kopia: Option<KopiaDestinationSpec>,
}

/// Mover env-var wire format for additional CLI arguments. Not consumed
/// by the maintenance scheduled task itself (which runs the engine's own
/// maintenance command, not user args) but exposed here since it crosses
/// the maintenance boundary for any mover this core's objects are read
/// back by.
pub const ADDITIONAL_ARGS_ENV_VAR: &str = "KOPIA_ADDITIONAL_ARGS";
pub const ADDITIONAL_ARGS_SEPARATOR: &str = "|VOLSYNC_ARG_SEP|";

pub fn encode_additional_args(args: &[String]) -> Option<String> {
  if args.is_empty() {
    None
  } else {
    Some(args.join(ADDITIONAL_ARGS_SEPARATOR))
  }
}
