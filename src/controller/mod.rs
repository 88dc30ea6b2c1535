pub mod cluster_connection_reconciler;
pub mod context;
pub mod database_reconciler;
pub mod default_privilege_reconciler;
pub mod error;
pub mod grant_reconciler;
pub mod reconciler;
pub mod resolver;
pub mod role_reconciler;
pub mod schema_reconciler;
pub mod status;

pub use cluster_connection_reconciler::{
    CONNECTION_ERROR_REQUEUE, cluster_connection_error_policy, reconcile_cluster_connection,
};
pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{
    CleanupStep, ManagedResource, cleanup_step, error_policy, mark_deleting, reconcile,
};
pub use status::{FINALIZER, Outcome, StatusManager, Transition, transition};
