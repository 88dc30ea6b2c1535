//! ClusterConnection reconciler
//!
//! Probes the server with the admin credentials and reports `READY` with the
//! server version, which is what lets referencing resources proceed. A
//! connection owns nothing on the server, so it carries no finalizer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::{Outcome, StatusManager, transition};
use crate::crd::{ClusterConnection, ManagedStatus};
use crate::resources::PostgresSession;

const KIND: &str = "ClusterConnection";

/// Requeue delay after a failed probe
pub const CONNECTION_ERROR_REQUEUE: Duration = Duration::from_secs(30);

async fn probe(connection: &ClusterConnection, ctx: &Context) -> Result<String> {
    let session = PostgresSession::connect(&ctx.client, connection, None).await?;
    Ok(session.version_string().await?)
}

/// Reconcile a ClusterConnection
#[instrument(skip(connection, ctx), fields(kind = KIND, name = %connection.name_any(), namespace = connection.namespace().unwrap_or_default()))]
pub async fn reconcile_cluster_connection(
    connection: Arc<ClusterConnection>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let started = Instant::now();
    let namespace = connection
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = connection.name_any();

    if connection.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let now = Utc::now();
    let previous = connection.status.as_ref();
    let probed = ManagedStatus::probe(
        previous,
        connection.endpoint(),
        connection.metadata.generation,
        now,
    );

    let outcome = match probe(&connection, &ctx).await {
        Ok(version) => Outcome::Converged(Some(version)),
        Err(e) => {
            warn!(error = %e, "ClusterConnection probe failed");
            Outcome::Failed(e.to_string())
        }
    };
    let failed = matches!(outcome, Outcome::Failed(_));

    let next = transition(previous, probed, outcome, CONNECTION_ERROR_REQUEUE, now);
    if let Some(status) = &next.status {
        StatusManager::new(connection.as_ref(), &ctx)?
            .update(status)
            .await?;
        info!(phase = %status.phase, "ClusterConnection status changed");
    }

    ctx.record_reconcile(KIND, &namespace, &name, started.elapsed(), failed);
    Ok(Action::requeue(next.requeue_after))
}

/// Error policy for the ClusterConnection controller
pub fn cluster_connection_error_policy(
    connection: Arc<ClusterConnection>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    let delay = BackoffConfig::default().delay_for_error(error, 0);
    error!(
        name = %connection.name_any(),
        error = %error,
        "ClusterConnection reconciliation error, requeuing in {:?}",
        delay
    );
    Action::requeue(delay)
}
