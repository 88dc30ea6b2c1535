//! Types shared by every managed PostgreSQL resource kind
//!
//! Each kind references a `ClusterConnection` through a [`ClusterRef`] and
//! reports progress through the same [`ManagedStatus`] sub-object.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group for all custom resources owned by this operator
pub const API_GROUP: &str = "postgresql.aboutbits.it";

/// Reference to a ClusterConnection
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    /// Name of the ClusterConnection
    pub name: String,

    /// Namespace of the ClusterConnection (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ClusterRef {
    /// Namespace to look the connection up in
    pub fn namespace_or<'a>(&'a self, own_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(own_namespace)
    }
}

/// Reference to a Secret of type `kubernetes.io/basic-auth`
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretRef {
    pub fn namespace_or<'a>(&'a self, own_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(own_namespace)
    }
}

/// What happens to the server-side object when the resource is deleted
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// Leave the object on the server
    #[default]
    Retain,
    /// Drop the object from the server
    Delete,
}

impl std::fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReclaimPolicy::Retain => write!(f, "Retain"),
            ReclaimPolicy::Delete => write!(f, "Delete"),
        }
    }
}

/// Lifecycle phase of a managed resource
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Waiting on a dependency (usually the ClusterConnection)
    #[default]
    Pending,
    /// Server state matches the declared state
    Ready,
    /// The last reconciliation failed, see `message`
    Error,
    /// Cleanup is in progress
    Deleting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pending => write!(f, "PENDING"),
            Phase::Ready => write!(f, "READY"),
            Phase::Error => write!(f, "ERROR"),
            Phase::Deleting => write!(f, "DELETING"),
        }
    }
}

/// Status shared by every managed resource kind
///
/// `last_phase_transition_time` is only touched through [`ManagedStatus::set_phase`],
/// which leaves it alone unless the phase actually changes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus {
    /// Resolved display name of the managed object
    #[serde(default)]
    pub name: String,

    /// Current phase
    #[serde(default)]
    pub phase: Phase,

    /// Human-readable detail about the current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the resource was reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<String>,

    /// Last time `phase` changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_phase_transition_time: Option<String>,

    /// Generation of the spec that was last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ManagedStatus {
    /// Fresh status for a resource that has never been reconciled
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Pending,
            last_phase_transition_time: Some(timestamp(now)),
            ..Default::default()
        }
    }

    /// Start from the existing status, or a fresh one, and record this probe
    pub fn probe(
        existing: Option<&ManagedStatus>,
        name: String,
        generation: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut status = existing.cloned().unwrap_or_else(|| Self::pending(now));
        status.name = name;
        status.last_probe_time = Some(timestamp(now));
        status.observed_generation = match (status.observed_generation, generation) {
            (Some(observed), Some(current)) => Some(observed.max(current)),
            (observed, current) => current.or(observed),
        };
        status
    }

    /// Change the phase, moving the transition time only when the phase differs
    pub fn set_phase(&mut self, phase: Phase, now: DateTime<Utc>) -> &mut Self {
        if self.phase != phase || self.last_phase_transition_time.is_none() {
            self.phase = phase;
            self.last_phase_transition_time = Some(timestamp(now));
        }
        self
    }

    pub fn set_message(&mut self, message: Option<String>) -> &mut Self {
        self.message = message;
        self
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}
