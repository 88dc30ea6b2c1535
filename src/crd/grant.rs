//! Grant CRD definition
//!
//! A Grant owns every privilege `role` holds on objects of `objectType` within
//! its scope: privileges that are not declared are revoked.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ClusterRef, ManagedStatus};
use super::privilege::Privilege;
use crate::resources::sql::quote_identifier;

/// Privileges of one role on database objects
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgresql.aboutbits.it",
    version = "v1",
    kind = "Grant",
    plural = "grants",
    shortname = "pggrant",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Role", "type":"string", "jsonPath":".spec.role"}"#,
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.objectType"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Since", "type":"date", "jsonPath":".status.lastPhaseTransitionTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GrantSpec {
    /// Reference to the ClusterConnection
    pub cluster_ref: ClusterRef,

    /// Database to connect to (immutable)
    pub database: String,

    /// Grantee (immutable)
    pub role: String,

    /// Schema holding the objects; not used for `database`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Kind of object the privileges apply to (immutable)
    pub object_type: GrantObjectType,

    /// Objects to grant on; empty means every object of the type in the schema
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<String>,

    /// Privileges to hold
    pub privileges: Vec<Privilege>,
}

/// Object types a Grant can target
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GrantObjectType {
    Database,
    Schema,
    Table,
    Sequence,
}

/// Where the catalog keeps existence, ownership and ACLs for an object type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogStrategy {
    /// `pg_database`, keyed by `datname`
    Database,
    /// `pg_namespace`, keyed by `nspname`
    Namespace,
    /// `pg_class` rows of the given kinds inside one namespace
    Relation { relkinds: &'static [&'static str] },
}

impl GrantObjectType {
    /// Privileges that may be granted on this object type
    pub fn legal_privileges(&self) -> &'static [Privilege] {
        match self {
            GrantObjectType::Database => &[
                Privilege::Create,
                Privilege::Connect,
                Privilege::Temporary,
            ],
            GrantObjectType::Schema => &[Privilege::Usage, Privilege::Create],
            GrantObjectType::Table => &[
                Privilege::Select,
                Privilege::Insert,
                Privilege::Update,
                Privilege::Delete,
                Privilege::Truncate,
                Privilege::References,
                Privilege::Trigger,
                Privilege::Maintain,
            ],
            GrantObjectType::Sequence => &[Privilege::Usage, Privilege::Select, Privilege::Update],
        }
    }

    pub fn catalog_strategy(&self) -> CatalogStrategy {
        match self {
            GrantObjectType::Database => CatalogStrategy::Database,
            GrantObjectType::Schema => CatalogStrategy::Namespace,
            // ordinary, partitioned, view, materialized view, foreign table
            GrantObjectType::Table => CatalogStrategy::Relation {
                relkinds: &["r", "p", "v", "m", "f"],
            },
            GrantObjectType::Sequence => CatalogStrategy::Relation { relkinds: &["S"] },
        }
    }

    /// SQL keyword used in `GRANT ... ON <keyword> ...`
    pub fn keyword(&self) -> &'static str {
        match self {
            GrantObjectType::Database => "DATABASE",
            GrantObjectType::Schema => "SCHEMA",
            GrantObjectType::Table => "TABLE",
            GrantObjectType::Sequence => "SEQUENCE",
        }
    }

    /// Plural keyword for `GRANT ... ON ALL <keyword> IN SCHEMA`, if supported
    pub fn bulk_keyword(&self) -> Option<&'static str> {
        match self {
            GrantObjectType::Table => Some("TABLES"),
            GrantObjectType::Sequence => Some("SEQUENCES"),
            GrantObjectType::Database | GrantObjectType::Schema => None,
        }
    }

    /// Objects of this type are addressed as `schema.object`
    pub fn is_schema_qualified(&self) -> bool {
        matches!(self, GrantObjectType::Table | GrantObjectType::Sequence)
    }
}

impl std::fmt::Display for GrantObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrantObjectType::Database => write!(f, "database"),
            GrantObjectType::Schema => write!(f, "schema"),
            GrantObjectType::Table => write!(f, "table"),
            GrantObjectType::Sequence => write!(f, "sequence"),
        }
    }
}

impl GrantSpec {
    /// Schema name, or an empty string for database grants
    pub fn schema_name(&self) -> &str {
        self.schema.as_deref().unwrap_or_default()
    }

    /// Human readable summary used as the status name
    pub fn describe(&self) -> String {
        let privileges: Vec<&str> = self.privileges.iter().map(Privilege::as_sql).collect();
        let target = match self.object_type {
            GrantObjectType::Database => format!("DATABASE {}", quote_identifier(&self.database)),
            GrantObjectType::Schema => {
                format!("SCHEMA {}", quote_identifier(self.schema_name()))
            }
            object_type if self.objects.is_empty() => format!(
                "ALL {} IN SCHEMA {}",
                object_type.bulk_keyword().unwrap_or_default(),
                quote_identifier(self.schema_name())
            ),
            object_type => {
                let objects: Vec<String> = self
                    .objects
                    .iter()
                    .map(|object| {
                        format!(
                            "{}.{}",
                            quote_identifier(self.schema_name()),
                            quote_identifier(object)
                        )
                    })
                    .collect();
                format!("{} {}", object_type.keyword(), objects.join(", "))
            }
        };

        format!(
            "{} ON {} TO {}",
            privileges.join(", "),
            target,
            quote_identifier(&self.role)
        )
    }
}
