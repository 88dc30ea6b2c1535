//! ClusterRef resolution

use kube::Api;
use tracing::debug;

use crate::controller::Context;
use crate::controller::error::Result;
use crate::crd::{ClusterConnection, ClusterRef};
use crate::diff::resource_ref;

/// Look up the ClusterConnection behind `cluster_ref`
///
/// Returns `None` when it does not exist or has not reported `READY` yet.
pub async fn resolve(
    ctx: &Context,
    cluster_ref: &ClusterRef,
    own_namespace: &str,
) -> Result<Option<ClusterConnection>> {
    let namespace = cluster_ref.namespace_or(own_namespace);
    let api: Api<ClusterConnection> = Api::namespaced(ctx.client.clone(), namespace);

    let connection = api
        .get_opt(&cluster_ref.name)
        .await?
        .filter(ClusterConnection::is_ready);

    if connection.is_none() {
        debug!(
            cluster_ref = %resource_ref(namespace, &cluster_ref.name),
            "ClusterConnection missing or not ready"
        );
    }
    Ok(connection)
}

/// Status message while waiting for the connection
pub fn not_ready_message(cluster_ref: &ClusterRef, own_namespace: &str) -> String {
    format!(
        "The specified ClusterConnection does not exist or is not ready yet [resource={}]",
        resource_ref(cluster_ref.namespace_or(own_namespace), &cluster_ref.name)
    )
}

/// Status message when cleanup cannot reach the connection
pub fn gone_message(cluster_ref: &ClusterRef, own_namespace: &str) -> String {
    format!(
        "The specified ClusterConnection no longer exists or is not ready yet [resource={}]",
        resource_ref(cluster_ref.namespace_or(own_namespace), &cluster_ref.name)
    )
}
