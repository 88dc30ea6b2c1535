//! Object privileges understood by GRANT and ALTER DEFAULT PRIVILEGES

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single PostgreSQL object privilege
///
/// Ordering follows declaration order so rendered privilege lists are stable.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    References,
    Trigger,
    Create,
    Connect,
    Temporary,
    Usage,
    /// Available from PostgreSQL 17
    Maintain,
}

impl Privilege {
    /// Returns the SQL keyword for this privilege
    pub fn as_sql(&self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Truncate => "TRUNCATE",
            Privilege::References => "REFERENCES",
            Privilege::Trigger => "TRIGGER",
            Privilege::Create => "CREATE",
            Privilege::Connect => "CONNECT",
            Privilege::Temporary => "TEMPORARY",
            Privilege::Usage => "USAGE",
            Privilege::Maintain => "MAINTAIN",
        }
    }

    /// Lowest server major version that knows this privilege
    pub fn minimum_server_version(&self) -> Option<u32> {
        match self {
            Privilege::Maintain => Some(17),
            _ => None,
        }
    }

    /// Parse a `privilege_type` value as reported by `aclexplode`
    pub fn from_acl(value: &str) -> Option<Self> {
        let privilege = match value.to_ascii_uppercase().as_str() {
            "SELECT" => Privilege::Select,
            "INSERT" => Privilege::Insert,
            "UPDATE" => Privilege::Update,
            "DELETE" => Privilege::Delete,
            "TRUNCATE" => Privilege::Truncate,
            "REFERENCES" => Privilege::References,
            "TRIGGER" => Privilege::Trigger,
            "CREATE" => Privilege::Create,
            "CONNECT" => Privilege::Connect,
            "TEMPORARY" | "TEMP" => Privilege::Temporary,
            "USAGE" => Privilege::Usage,
            "MAINTAIN" => Privilege::Maintain,
            _ => return None,
        };
        Some(privilege)
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Render privileges as `[A, B]`, the format used in status messages
pub fn format_privilege_list<'a>(privileges: impl IntoIterator<Item = &'a Privilege>) -> String {
    let names: Vec<&str> = privileges.into_iter().map(Privilege::as_sql).collect();
    format!("[{}]", names.join(", "))
}
