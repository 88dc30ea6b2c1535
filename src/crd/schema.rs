//! Schema CRD definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ClusterRef, ManagedStatus, ReclaimPolicy};

/// A schema inside one database on the server referenced by `clusterRef`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgresql.aboutbits.it",
    version = "v1",
    kind = "Schema",
    plural = "schemas",
    shortname = "pgschema",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Database", "type":"string", "jsonPath":".spec.database"}"#,
    printcolumn = r#"{"name":"Name", "type":"string", "jsonPath":".status.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    /// Reference to the ClusterConnection
    pub cluster_ref: ClusterRef,

    /// Database the schema lives in (immutable)
    pub database: String,

    /// Name of the schema (immutable)
    pub name: String,

    /// Role that owns the schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Whether the schema is dropped when this resource is deleted
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,
}
