pub mod config;
pub mod controller;
pub mod crd;
pub mod diff;
pub mod health;
pub mod resources;

pub use config::OperatorConfig;
pub use controller::{
    BackoffConfig, Context, Error, FINALIZER, ManagedResource, Result,
    cluster_connection_error_policy, error_policy, reconcile, reconcile_cluster_connection,
};
pub use crd::{ClusterConnection, Database, DefaultPrivilege, Grant, Role, Schema};
pub use health::{HealthState, Metrics};

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Log one item of a controller's result stream
async fn log_result<K, E>(
    kind: &'static str,
    result: std::result::Result<(ObjectRef<K>, Action), kube::runtime::controller::Error<Error, E>>,
) where
    K: Resource,
    E: std::error::Error,
{
    match result {
        Ok((obj, _action)) => {
            tracing::debug!(kind, "Reconciled: {}", obj.name);
        }
        Err(e) => {
            // ObjectNotFound errors are expected after deletion when a queued
            // reconciliation fires for an object that is already gone.
            let is_not_found = matches!(
                &e,
                kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
            );
            if is_not_found {
                tracing::debug!(kind, "Object no longer exists (likely deleted): {:?}", e);
            } else {
                tracing::error!(kind, "Reconciliation error: {:?}", e);
            }
        }
    }
}

/// Run the controller for one managed resource kind.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_managed_controller<K>(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) where
    K: ManagedResource,
{
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for {} resources (scope: {})",
        K::KIND,
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone(), health_state));
    let api: Api<K> = scoped_api(client, namespace);

    // any_semantic() for more reliable resource discovery in test environments
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(api, watcher_config)
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| log_result(K::KIND, result))
        .await;

    tracing::error!("{} controller stream ended unexpectedly", K::KIND);
}

/// Run the Role controller.
///
/// Besides Roles it watches Secrets and requeues every Role whose
/// `passwordSecretRef` points at a changed Secret.
pub async fn run_role_controller(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!("Starting controller for Role resources (scope: {})", scope_msg);

    let ctx = Arc::new(Context::new(client.clone(), health_state));
    let roles: Api<Role> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client, namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    let controller = Controller::new(roles, watcher_config.clone());
    let store = controller.store();

    controller
        .watches(secrets, watcher_config, move |secret: Secret| {
            let secret_name = secret.name_any();
            let secret_namespace = secret.namespace();
            store
                .state()
                .into_iter()
                .filter(|role| role.references_secret(&secret_name, secret_namespace.as_deref()))
                .map(|role| ObjectRef::from_obj(role.as_ref()))
                .collect::<Vec<_>>()
        })
        .run(reconcile::<Role>, error_policy::<Role>, ctx)
        .for_each(|result| log_result("Role", result))
        .await;

    tracing::error!("Role controller stream ended unexpectedly");
}

/// Run the ClusterConnection controller.
pub async fn run_cluster_connection_controller(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for ClusterConnection resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone(), health_state));
    let connections: Api<ClusterConnection> = scoped_api(client, namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(connections, watcher_config)
        .run(
            reconcile_cluster_connection,
            cluster_connection_error_policy,
            ctx,
        )
        .for_each(|result| log_result("ClusterConnection", result))
        .await;

    tracing::error!("ClusterConnection controller stream ended unexpectedly");
}

/// Run every controller until one of them stops.
pub async fn run_controllers(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    if let Some(state) = &health_state {
        state.set_ready(true).await;
    }

    tokio::join!(
        run_cluster_connection_controller(client.clone(), health_state.clone(), namespace),
        run_managed_controller::<Database>(client.clone(), health_state.clone(), namespace),
        run_managed_controller::<Schema>(client.clone(), health_state.clone(), namespace),
        run_role_controller(client.clone(), health_state.clone(), namespace),
        run_managed_controller::<Grant>(client.clone(), health_state.clone(), namespace),
        run_managed_controller::<DefaultPrivilege>(client, health_state, namespace),
    );
}
