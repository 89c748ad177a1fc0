//! Cross-namespace maintenance-scheduler core: for every distinct
//! repository referenced by any replication source in the cluster,
//! drives exactly one centralized scheduled task into existence, with
//! first-wins schedule-conflict resolution and garbage collection of
//! orphaned objects.

pub mod client;
pub mod context;
pub mod error;
pub mod gc;
pub mod labels;
pub mod naming;
pub mod principal;
pub mod reconciler;
pub mod secret_mirror;
pub mod source;
pub mod status;
pub mod task_builder;

pub use context::MaintenanceContext;
pub use error::MaintenanceError;
