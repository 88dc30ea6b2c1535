//! Status and finalizer management for managed resources
//!
//! Every kind shares [`ManagedStatus`]; the pure [`transition`] function
//! decides what a reconciliation outcome does to it, and [`StatusManager`]
//! writes the result back through the status subresource.

use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{ManagedStatus, Phase};

/// Field manager recorded on every patch
pub const FIELD_MANAGER: &str = "pg-object-operator";

/// Finalizer guarding server-side cleanup
pub const FINALIZER: &str = "postgresql.aboutbits.it/finalizer";

/// Requeue interval once a resource is converged
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue interval while the referenced ClusterConnection is not ready
pub const PENDING_REQUEUE: Duration = Duration::from_secs(60);

/// Result of one reconciliation, before it is written to the status
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Server state already matched; nothing ran
    Converged(Option<String>),
    /// Statements ran and were committed
    Applied(Option<String>),
    /// Waiting on the referenced ClusterConnection
    Pending(String),
    /// Validation or infrastructure failure
    Failed(String),
}

/// What to persist and when to look again
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// New status to write, `None` to skip the write
    pub status: Option<ManagedStatus>,
    pub requeue_after: Duration,
}

/// Apply `outcome` to the freshly probed status
///
/// The status is only written when phase, message, name or observed
/// generation moved; a newer `lastProbeTime` alone is not a change, since
/// every write re-triggers the reconcile through the watch.
pub fn transition(
    previous: Option<&ManagedStatus>,
    mut probed: ManagedStatus,
    outcome: Outcome,
    error_requeue: Duration,
    now: DateTime<Utc>,
) -> Transition {
    let requeue_after = match outcome {
        Outcome::Converged(message) => {
            let was_ready = probed.phase == Phase::Ready;
            let message = match message {
                Some(message) => Some(message),
                None if was_ready => probed.message.take(),
                None => None,
            };
            probed.set_phase(Phase::Ready, now).set_message(message);
            RESYNC_INTERVAL
        }
        Outcome::Applied(message) => {
            probed.set_phase(Phase::Ready, now).set_message(message);
            RESYNC_INTERVAL
        }
        Outcome::Pending(message) => {
            probed.set_phase(Phase::Pending, now).set_message(Some(message));
            PENDING_REQUEUE
        }
        Outcome::Failed(message) => {
            probed.set_phase(Phase::Error, now).set_message(Some(message));
            error_requeue
        }
    };

    Transition {
        status: (!is_unchanged(previous, &probed)).then_some(probed),
        requeue_after,
    }
}

/// Whether `next` reports nothing `previous` did not already say
pub fn is_unchanged(previous: Option<&ManagedStatus>, next: &ManagedStatus) -> bool {
    previous.is_some_and(|previous| {
        previous.phase == next.phase
            && previous.message == next.message
            && previous.name == next.name
            && previous.observed_generation == next.observed_generation
    })
}

/// Merge patch body for `status`
///
/// Absent optional fields are sent as `null` so a merge patch clears them.
pub fn status_patch(status: &ManagedStatus) -> Result<Value> {
    let mut value = serde_json::to_value(status)?;
    if let Value::Object(fields) = &mut value {
        for key in [
            "message",
            "lastProbeTime",
            "lastPhaseTransitionTime",
            "observedGeneration",
        ] {
            fields.entry(key).or_insert(Value::Null);
        }
    }
    Ok(json!({ "status": value }))
}

/// Whether our finalizer is present
pub fn has_finalizer<K: Resource>(resource: &K) -> bool {
    resource.finalizers().iter().any(|f| f == FINALIZER)
}

/// Finalizer list with ours appended
pub fn finalizers_with<K: Resource>(resource: &K) -> Vec<String> {
    let mut finalizers = resource.finalizers().to_vec();
    if !finalizers.iter().any(|f| f == FINALIZER) {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

/// Finalizer list with ours removed and every other one kept
pub fn finalizers_without<K: Resource>(resource: &K) -> Vec<String> {
    resource
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect()
}

fn finalizer_patch<K: Resource>(resource: &K, finalizers: Vec<String>) -> Value {
    json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": resource.resource_version(),
        }
    })
}

/// Status and finalizer writes for one managed resource
pub struct StatusManager<'a, K> {
    resource: &'a K,
    api: Api<K>,
}

impl<'a, K> StatusManager<'a, K>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    pub fn new(resource: &'a K, ctx: &Context) -> Result<Self> {
        let namespace = resource
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(Self {
            resource,
            api: Api::namespaced(ctx.client.clone(), &namespace),
        })
    }

    /// Replace the status subresource
    pub async fn update(&self, status: &ManagedStatus) -> Result<()> {
        let name = self.resource.name_any();
        let patch = status_patch(status)?;

        self.api
            .patch_status(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;

        debug!(name = %name, phase = %status.phase, "Updated status");
        Ok(())
    }

    pub async fn add_finalizer(&self) -> Result<()> {
        let name = self.resource.name_any();
        let patch = finalizer_patch(self.resource, finalizers_with(self.resource));

        self.api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;

        info!(name = %name, "Added finalizer");
        Ok(())
    }

    pub async fn remove_finalizer(&self) -> Result<()> {
        if !has_finalizer(self.resource) {
            return Ok(());
        }
        let name = self.resource.name_any();
        let patch = finalizer_patch(self.resource, finalizers_without(self.resource));

        self.api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;

        info!(name = %name, "Removed finalizer");
        Ok(())
    }
}
