//! DefaultPrivilege CRD definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ClusterRef, ManagedStatus};
use super::privilege::Privilege;
use crate::resources::sql::quote_identifier;

/// Privileges granted to `role` on objects `owner` creates in the future
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgresql.aboutbits.it",
    version = "v1",
    kind = "DefaultPrivilege",
    plural = "defaultprivileges",
    shortname = "pgdefpriv",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Owner", "type":"string", "jsonPath":".spec.owner"}"#,
    printcolumn = r#"{"name":"Role", "type":"string", "jsonPath":".spec.role"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPrivilegeSpec {
    /// Reference to the ClusterConnection
    pub cluster_ref: ClusterRef,

    /// Database to connect to (immutable)
    pub database: String,

    /// Grantee (immutable)
    pub role: String,

    /// Role whose newly created objects receive the privileges (immutable)
    pub owner: String,

    /// Schema the defaults apply to; not used for `schema`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Kind of future object (immutable)
    pub object_type: DefaultPrivilegeObjectType,

    /// Privileges to hold
    pub privileges: Vec<Privilege>,
}

/// Object types ALTER DEFAULT PRIVILEGES can target
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPrivilegeObjectType {
    Schema,
    Table,
    Sequence,
}

impl DefaultPrivilegeObjectType {
    pub fn legal_privileges(&self) -> &'static [Privilege] {
        match self {
            DefaultPrivilegeObjectType::Schema => &[Privilege::Usage, Privilege::Create],
            DefaultPrivilegeObjectType::Table => &[
                Privilege::Select,
                Privilege::Insert,
                Privilege::Update,
                Privilege::Delete,
                Privilege::Truncate,
                Privilege::References,
                Privilege::Trigger,
                Privilege::Maintain,
            ],
            DefaultPrivilegeObjectType::Sequence => {
                &[Privilege::Usage, Privilege::Select, Privilege::Update]
            }
        }
    }

    /// Value of `pg_default_acl.defaclobjtype`
    pub fn catalog_code(&self) -> &'static str {
        match self {
            DefaultPrivilegeObjectType::Schema => "n",
            DefaultPrivilegeObjectType::Table => "r",
            DefaultPrivilegeObjectType::Sequence => "S",
        }
    }

    /// Keyword used in `... ON <keyword> TO ...`
    pub fn keyword(&self) -> &'static str {
        match self {
            DefaultPrivilegeObjectType::Schema => "SCHEMAS",
            DefaultPrivilegeObjectType::Table => "TABLES",
            DefaultPrivilegeObjectType::Sequence => "SEQUENCES",
        }
    }

    /// Schema defaults are global and take no `IN SCHEMA` clause
    pub fn is_schema_scoped(&self) -> bool {
        !matches!(self, DefaultPrivilegeObjectType::Schema)
    }
}

impl std::fmt::Display for DefaultPrivilegeObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultPrivilegeObjectType::Schema => write!(f, "schema"),
            DefaultPrivilegeObjectType::Table => write!(f, "table"),
            DefaultPrivilegeObjectType::Sequence => write!(f, "sequence"),
        }
    }
}

impl DefaultPrivilegeSpec {
    /// Schema filter, `None` for schema defaults
    pub fn scoped_schema(&self) -> Option<&str> {
        if self.object_type.is_schema_scoped() {
            self.schema.as_deref()
        } else {
            None
        }
    }

    pub fn describe(&self) -> String {
        let privileges: Vec<&str> = self.privileges.iter().map(Privilege::as_sql).collect();
        let scope = match self.scoped_schema() {
            Some(schema) => format!(" IN SCHEMA {}", quote_identifier(schema)),
            None => String::new(),
        };
        format!(
            "FOR ROLE {}{} {} ON {} TO {}",
            quote_identifier(&self.owner),
            scope,
            privileges.join(", "),
            self.object_type.keyword(),
            quote_identifier(&self.role)
        )
    }
}
