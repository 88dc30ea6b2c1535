//! Generic reconciliation loop shared by every managed resource kind
//!
//! Each kind implements [`ManagedResource`]; [`reconcile`] drives finalizer
//! handling, ClusterRef resolution, session management, status bookkeeping
//! and two-phase cleanup around the kind-specific `converge` and `cleanup`.
//! Failures inside a reconciliation end up in `status.message`; only failed
//! Kubernetes writes reach [`error_policy`].

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_postgres::Transaction;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::resolver::{self, gone_message, not_ready_message};
use crate::controller::status::{Outcome, StatusManager, has_finalizer, is_unchanged, transition};
use crate::crd::{ClusterConnection, ClusterRef, ManagedStatus, Phase};
use crate::diff::{Plan, Rejection, resource_ref};
use crate::resources::{PostgresSession, apply_statements};

/// Requeue after adding the finalizer or marking a resource as deleting
const FOLLOW_UP_REQUEUE: Duration = Duration::from_secs(1);

/// Requeue while cleanup cannot finish
const CLEANUP_RETRY: Duration = Duration::from_secs(60);

/// A custom resource whose server-side object this operator converges
pub trait ManagedResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Kind name used in status messages and metrics
    const KIND: &'static str;

    /// Requeue delay after a failed reconciliation
    const ERROR_REQUEUE: Duration = Duration::from_secs(60);

    fn status(&self) -> Option<&ManagedStatus>;

    fn cluster_ref(&self) -> &ClusterRef;

    /// Value for `status.name`
    fn display_name(&self) -> String;

    /// Database to open the session against; `None` for the maintenance database
    fn target_database(&self) -> Option<&str>;

    /// Whether deletion touches the server
    fn drops_on_delete(&self) -> bool;

    /// Checks that need no server
    fn preflight(&self, _resource: &str) -> Result<(), Rejection> {
        Ok(())
    }

    /// Observe, plan and apply; returns `Converged` or `Applied`
    fn converge(
        &self,
        session: &mut PostgresSession,
        ctx: &Context,
    ) -> impl Future<Output = Result<Outcome>> + Send;

    /// Remove the server-side object or revoke what it granted
    fn cleanup(&self, session: &mut PostgresSession) -> impl Future<Output = Result<()>> + Send;

    /// `namespace/name` of this resource
    fn qualified_name(&self) -> String {
        resource_ref(&self.namespace().unwrap_or_default(), &self.name_any())
    }
}

/// Run a plan inside `tx`, committing only when statements ran
pub(crate) async fn commit_plan(tx: Transaction<'_>, plan: Plan) -> Result<Outcome> {
    if plan.is_converged() {
        tx.rollback().await?;
        return Ok(Outcome::Converged(plan.message));
    }
    apply_statements(&tx, &plan.statements).await?;
    tx.commit().await?;
    Ok(Outcome::Applied(plan.message))
}

/// What a deletion pass does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupStep {
    /// Record `DELETING` and come back
    MarkDeleting,
    /// Let go of the resource without touching the server
    Release,
    /// Remove the server-side object, then let go
    Drop,
}

pub fn cleanup_step(phase: Phase, drops_on_delete: bool) -> CleanupStep {
    match (phase, drops_on_delete) {
        (Phase::Deleting, true) => CleanupStep::Drop,
        (Phase::Deleting, false) => CleanupStep::Release,
        _ => CleanupStep::MarkDeleting,
    }
}

/// Default backoff configuration for error handling
fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Main reconciliation function
#[instrument(skip(resource, ctx), fields(kind = K::KIND, name = %resource.name_any(), namespace = resource.namespace().unwrap_or_default()))]
pub async fn reconcile<K: ManagedResource>(resource: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let started = Instant::now();
    let namespace = resource
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let result = if resource.meta().deletion_timestamp.is_some() {
        handle_deletion(resource.as_ref(), &ctx, &namespace).await
    } else {
        reconcile_resource(resource.as_ref(), &ctx, &namespace).await
    };

    let failed = !matches!(result, Ok((_, false)));
    ctx.record_reconcile(
        K::KIND,
        &namespace,
        &resource.name_any(),
        started.elapsed(),
        failed,
    );
    result.map(|(action, _)| action)
}

/// Error policy for the controller with exponential backoff
///
/// Only reached when a Kubernetes write failed; server-side failures are
/// reported through the status instead.
pub fn error_policy<K: ManagedResource>(resource: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = resource.name_any();
    let delay = default_backoff().delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(kind = K::KIND, name = %name, error = %error, "Retryable error, requeuing in {:?}", delay);
    } else {
        error!(kind = K::KIND, name = %name, error = %error, "Non-retryable error, requeuing in {:?}", delay);
    }

    Action::requeue(delay)
}

/// Returns the action and whether the reconciliation failed
async fn reconcile_resource<K: ManagedResource>(
    resource: &K,
    ctx: &Context,
    namespace: &str,
) -> Result<(Action, bool)> {
    let status_manager = StatusManager::new(resource, ctx)?;

    if !has_finalizer(resource) {
        status_manager.add_finalizer().await?;
        return Ok((Action::requeue(FOLLOW_UP_REQUEUE), false));
    }

    let now = Utc::now();
    let previous = resource.status();
    let probed = ManagedStatus::probe(
        previous,
        resource.display_name(),
        resource.meta().generation,
        now,
    );

    let outcome = evaluate(resource, ctx, namespace).await;
    let failed = matches!(outcome, Outcome::Failed(_));
    match &outcome {
        Outcome::Converged(_) => debug!("Already converged"),
        Outcome::Applied(message) => info!(message = ?message, "Applied changes"),
        Outcome::Pending(message) => warn!(message = %message, "Waiting for ClusterConnection"),
        Outcome::Failed(message) => error!(message = %message, "Reconciliation failed"),
    }

    let next = transition(previous, probed, outcome, K::ERROR_REQUEUE, now);
    if let Some(status) = &next.status {
        status_manager.update(status).await?;
    }

    Ok((Action::requeue(next.requeue_after), failed))
}

/// Pre-flight, resolve, connect and converge; every failure becomes an outcome
async fn evaluate<K: ManagedResource>(resource: &K, ctx: &Context, namespace: &str) -> Outcome {
    if let Err(rejection) = resource.preflight(&resource.qualified_name()) {
        return Outcome::Failed(rejection.0);
    }

    let connection = match resolver::resolve(ctx, resource.cluster_ref(), namespace).await {
        Ok(Some(connection)) => connection,
        Ok(None) => return Outcome::Pending(not_ready_message(resource.cluster_ref(), namespace)),
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    match converge_with(resource, ctx, &connection).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

async fn converge_with<K: ManagedResource>(
    resource: &K,
    ctx: &Context,
    connection: &ClusterConnection,
) -> Result<Outcome> {
    let mut session =
        PostgresSession::connect(&ctx.client, connection, resource.target_database()).await?;
    resource.converge(&mut session, ctx).await
}

async fn cleanup_with<K: ManagedResource>(
    resource: &K,
    ctx: &Context,
    connection: &ClusterConnection,
) -> Result<()> {
    let mut session =
        PostgresSession::connect(&ctx.client, connection, resource.target_database()).await?;
    resource.cleanup(&mut session).await
}

/// First deletion pass: `DELETING`, announcing the drop only when one follows
///
/// A retained resource keeps whatever message it already carried.
pub fn mark_deleting(status: &mut ManagedStatus, kind: &str, drops: bool, now: DateTime<Utc>) {
    status.set_phase(Phase::Deleting, now);
    if drops {
        status.set_message(Some(format!("{kind} deletion in progress")));
    }
}

/// Two-phase deletion
async fn handle_deletion<K: ManagedResource>(
    resource: &K,
    ctx: &Context,
    namespace: &str,
) -> Result<(Action, bool)> {
    if !has_finalizer(resource) {
        return Ok((Action::await_change(), false));
    }

    let status_manager = StatusManager::new(resource, ctx)?;
    let drops = resource.drops_on_delete();
    let phase = resource.status().map(|s| s.phase).unwrap_or_default();
    let now = Utc::now();
    let mut status = ManagedStatus::probe(
        resource.status(),
        resource.display_name(),
        resource.meta().generation,
        now,
    );

    match cleanup_step(phase, drops) {
        CleanupStep::MarkDeleting => {
            mark_deleting(&mut status, K::KIND, drops, now);
            status_manager.update(&status).await?;
            info!(drops, "Marked for deletion");
            Ok((Action::requeue(FOLLOW_UP_REQUEUE), false))
        }
        CleanupStep::Release => {
            status_manager.remove_finalizer().await?;
            info!("Released without touching the server");
            Ok((Action::await_change(), false))
        }
        CleanupStep::Drop => {
            let failure = match resolver::resolve(ctx, resource.cluster_ref(), namespace).await {
                Ok(Some(connection)) => cleanup_with(resource, ctx, &connection)
                    .await
                    .err()
                    .map(|e| format!("Deletion failed: {e}")),
                Ok(None) => Some(gone_message(resource.cluster_ref(), namespace)),
                Err(e) => Some(format!("Deletion failed: {e}")),
            };

            match failure {
                None => {
                    status_manager.remove_finalizer().await?;
                    info!("Cleanup finished");
                    Ok((Action::await_change(), false))
                }
                Some(message) => {
                    error!(message = %message, "Cleanup failed");
                    status
                        .set_phase(Phase::Deleting, now)
                        .set_message(Some(message));
                    if !is_unchanged(resource.status(), &status) {
                        status_manager.update(&status).await?;
                    }
                    Ok((Action::requeue(CLEANUP_RETRY), true))
                }
            }
        }
    }
}
