//! ClusterConnection CRD definition
//!
//! A ClusterConnection describes how the operator reaches one PostgreSQL server.
//! Every other resource kind points at one through its `clusterRef` and waits
//! until the connection reports `READY`.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ManagedStatus, Phase, SecretRef};

/// Connection details for a PostgreSQL server administered by the operator
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgresql.aboutbits.it",
    version = "v1",
    kind = "ClusterConnection",
    plural = "clusterconnections",
    shortname = "pgcc",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"Port", "type":"integer", "jsonPath":".spec.port"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConnectionSpec {
    /// Hostname or IP address of the server
    pub host: String,

    /// TCP port of the server (1-65535)
    #[schemars(range(min = 1, max = 65535))]
    pub port: u16,

    /// Maintenance database used for cluster-wide objects
    #[serde(default = "default_database")]
    pub database: String,

    /// Secret holding the administrator credentials
    pub admin_secret_ref: SecretRef,

    /// Extra libpq connection parameters (e.g. `sslmode`, `application_name`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

fn default_database() -> String {
    "postgres".to_string()
}

impl ClusterConnection {
    /// Whether resources referencing this connection may use it
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.phase == Phase::Ready)
    }

    /// `host:port/database`, used as the status display name
    pub fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.spec.host, self.spec.port, self.spec.database
        )
    }
}
