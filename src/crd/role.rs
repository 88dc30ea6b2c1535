//! Role CRD definition
//!
//! A Role with a `passwordSecretRef` is expected to be able to log in; its
//! password is read from that Secret and compared against the stored verifier
//! on every reconciliation.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ClusterRef, ManagedStatus, SecretRef};

/// A cluster-wide role on the server referenced by `clusterRef`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgresql.aboutbits.it",
    version = "v1",
    kind = "Role",
    plural = "roles",
    shortname = "pgrole",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Name", "type":"string", "jsonPath":".status.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Since", "type":"date", "jsonPath":".status.lastPhaseTransitionTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Name of the role on the server (immutable)
    pub name: String,

    /// Comment stored with `COMMENT ON ROLE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Reference to the ClusterConnection
    pub cluster_ref: ClusterRef,

    /// Secret with the role password; when set the role gets LOGIN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<SecretRef>,

    /// Role attributes and memberships
    #[serde(default)]
    pub flags: RoleFlags,
}

/// Attributes of a role
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleFlags {
    pub superuser: bool,
    pub createdb: bool,
    pub createrole: bool,
    pub inherit: bool,
    pub replication: bool,
    pub bypassrls: bool,

    /// Maximum concurrent connections, -1 for unlimited
    pub connection_limit: i32,

    /// RFC 3339 timestamp after which the password stops working; absent means never
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,

    /// Roles this role is a member of
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub in_role: Vec<String>,

    /// Roles that are members of this role
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub role: Vec<String>,
}

impl Default for RoleFlags {
    fn default() -> Self {
        Self {
            superuser: false,
            createdb: false,
            createrole: false,
            inherit: true,
            replication: false,
            bypassrls: false,
            connection_limit: -1,
            valid_until: None,
            in_role: Vec::new(),
            role: Vec::new(),
        }
    }
}

impl Role {
    /// Whether a change to the given Secret affects this Role
    pub fn references_secret(&self, secret_name: &str, secret_namespace: Option<&str>) -> bool {
        let Some(secret_ref) = &self.spec.password_secret_ref else {
            return false;
        };
        let own_namespace = self.namespace().unwrap_or_default();

        secret_ref.name == secret_name
            && secret_namespace == Some(secret_ref.namespace_or(&own_namespace))
    }
}
