//! Database CRD definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ClusterRef, ManagedStatus, ReclaimPolicy};

/// A database on the server referenced by `clusterRef`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgresql.aboutbits.it",
    version = "v1",
    kind = "Database",
    plural = "databases",
    shortname = "pgdb",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Name", "type":"string", "jsonPath":".status.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Since", "type":"date", "jsonPath":".status.lastPhaseTransitionTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Reference to the ClusterConnection
    pub cluster_ref: ClusterRef,

    /// Name of the database on the server (immutable)
    pub name: String,

    /// Role that owns the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Whether the database is dropped when this resource is deleted
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,
}
