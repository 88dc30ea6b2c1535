//! SQL statement builder
//!
//! Renders the DDL/DCL statements the diff planners decide on. DDL cannot be
//! parameterised, so identifiers are always double-quoted and literals escaped
//! here; nothing else in the crate formats SQL by hand.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::crd::{DefaultPrivilegeObjectType, GrantObjectType, Privilege};

/// A rendered statement ready to be sent with the simple query protocol
///
/// `Display` prints the redacted form, so statements carrying a password can be
/// logged safely. Use [`Statement::sql`] to execute.
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    redacted: Option<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            redacted: None,
        }
    }

    fn sensitive(sql: String, redacted: String) -> Self {
        Self {
            sql,
            redacted: Some(redacted),
        }
    }

    /// The statement text, including any secrets
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_sensitive(&self) -> bool {
        self.redacted.is_some()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.redacted.as_deref().unwrap_or(&self.sql))
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Statement").field(&self.to_string()).finish()
    }
}

/// Quote a SQL identifier (table name, role name, etc.)
/// Uses PostgreSQL's standard double-quote escaping
///
/// - `my_table` -> `"my_table"`
/// - `table"name` -> `"table""name"`
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal by doubling single quotes
///
/// Relies on `standard_conforming_strings`, which is on by default since 9.1.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn privilege_list<'a>(privileges: impl IntoIterator<Item = &'a Privilege>) -> String {
    privileges
        .into_iter()
        .map(Privilege::as_sql)
        .collect::<Vec<_>>()
        .join(", ")
}

fn identifier_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| quote_identifier(name))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Databases and schemas
// =============================================================================

pub fn create_database(name: &str) -> Statement {
    Statement::new(format!("CREATE DATABASE {}", quote_identifier(name)))
}

pub fn alter_database_owner(name: &str, owner: &str) -> Statement {
    Statement::new(format!(
        "ALTER DATABASE {} OWNER TO {}",
        quote_identifier(name),
        quote_identifier(owner)
    ))
}

pub fn drop_database(name: &str) -> Statement {
    Statement::new(format!("DROP DATABASE IF EXISTS {}", quote_identifier(name)))
}

pub fn create_schema(name: &str) -> Statement {
    Statement::new(format!("CREATE SCHEMA {}", quote_identifier(name)))
}

pub fn alter_schema_owner(name: &str, owner: &str) -> Statement {
    Statement::new(format!(
        "ALTER SCHEMA {} OWNER TO {}",
        quote_identifier(name),
        quote_identifier(owner)
    ))
}

pub fn drop_schema(name: &str) -> Statement {
    Statement::new(format!("DROP SCHEMA IF EXISTS {}", quote_identifier(name)))
}

// =============================================================================
// Roles
// =============================================================================

/// How an ALTER ROLE treats the password
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordChange<'a> {
    /// Leave the stored verifier untouched
    Keep,
    /// Store a new password
    Set(&'a str),
    /// Remove the password (`PASSWORD NULL`)
    Clear,
}

/// Full attribute set of a role; every attribute is always rendered
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleOptions<'a> {
    pub login: bool,
    pub password: PasswordChange<'a>,
    pub superuser: bool,
    pub createdb: bool,
    pub createrole: bool,
    pub inherit: bool,
    pub replication: bool,
    pub bypassrls: bool,
    pub connection_limit: i32,
    pub valid_until: Option<DateTime<Utc>>,
}

impl RoleOptions<'_> {
    /// Render the option list, returning the real and the redacted form
    fn render(&self) -> (String, String) {
        fn flag(enabled: bool, keyword: &str) -> String {
            if enabled {
                keyword.to_string()
            } else {
                format!("NO{keyword}")
            }
        }

        let (password, redacted_password) = match self.password {
            PasswordChange::Keep => (None, None),
            PasswordChange::Set(password) => (
                Some(format!("PASSWORD {}", quote_literal(password))),
                Some("PASSWORD '********'".to_string()),
            ),
            PasswordChange::Clear => (
                Some("PASSWORD NULL".to_string()),
                Some("PASSWORD NULL".to_string()),
            ),
        };

        let valid_until = match self.valid_until {
            Some(timestamp) => quote_literal(&timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => quote_literal("infinity"),
        };

        let tail = [
            flag(self.superuser, "SUPERUSER"),
            flag(self.createdb, "CREATEDB"),
            flag(self.createrole, "CREATEROLE"),
            flag(self.inherit, "INHERIT"),
            flag(self.replication, "REPLICATION"),
            flag(self.bypassrls, "BYPASSRLS"),
            format!("CONNECTION LIMIT {}", self.connection_limit),
            format!("VALID UNTIL {valid_until}"),
        ]
        .join(" ");

        let login = flag(self.login, "LOGIN");
        match (password, redacted_password) {
            (Some(password), Some(redacted)) => (
                format!("{login} {password} {tail}"),
                format!("{login} {redacted} {tail}"),
            ),
            _ => (format!("{login} {tail}"), format!("{login} {tail}")),
        }
    }
}

pub fn create_role(
    name: &str,
    options: &RoleOptions<'_>,
    in_role: &[String],
    members: &[String],
) -> Statement {
    let (rendered, redacted) = options.render();

    let mut membership = String::new();
    if !in_role.is_empty() {
        membership.push_str(&format!(" IN ROLE {}", identifier_list(in_role)));
    }
    if !members.is_empty() {
        membership.push_str(&format!(" ROLE {}", identifier_list(members)));
    }

    let sql = format!(
        "CREATE ROLE {} WITH {}{}",
        quote_identifier(name),
        rendered,
        membership
    );
    if matches!(options.password, PasswordChange::Set(_)) {
        let redacted = format!(
            "CREATE ROLE {} WITH {}{}",
            quote_identifier(name),
            redacted,
            membership
        );
        Statement::sensitive(sql, redacted)
    } else {
        Statement::new(sql)
    }
}

pub fn alter_role(name: &str, options: &RoleOptions<'_>) -> Statement {
    let (rendered, redacted) = options.render();
    let sql = format!("ALTER ROLE {} WITH {}", quote_identifier(name), rendered);
    if matches!(options.password, PasswordChange::Set(_)) {
        let redacted = format!("ALTER ROLE {} WITH {}", quote_identifier(name), redacted);
        Statement::sensitive(sql, redacted)
    } else {
        Statement::new(sql)
    }
}

pub fn drop_role(name: &str) -> Statement {
    Statement::new(format!("DROP ROLE IF EXISTS {}", quote_identifier(name)))
}

/// `COMMENT ON ROLE`, clearing the comment when `comment` is `None`
pub fn comment_on_role(name: &str, comment: Option<&str>) -> Statement {
    let value = comment.map_or_else(|| "NULL".to_string(), quote_literal);
    Statement::new(format!(
        "COMMENT ON ROLE {} IS {}",
        quote_identifier(name),
        value
    ))
}

/// Make `member` a member of `group`
pub fn grant_membership(group: &str, member: &str) -> Statement {
    Statement::new(format!(
        "GRANT {} TO {}",
        quote_identifier(group),
        quote_identifier(member)
    ))
}

pub fn revoke_membership(group: &str, member: &str) -> Statement {
    Statement::new(format!(
        "REVOKE {} FROM {}",
        quote_identifier(group),
        quote_identifier(member)
    ))
}

// =============================================================================
// Object privileges
// =============================================================================

fn qualified_object(object_type: GrantObjectType, schema: &str, object: &str) -> String {
    if object_type.is_schema_qualified() {
        format!("{}.{}", quote_identifier(schema), quote_identifier(object))
    } else {
        quote_identifier(object)
    }
}

/// `GRANT ... ON <type> <object> TO role`; `schema` is ignored for databases and schemas
pub fn grant_on_object<'a>(
    object_type: GrantObjectType,
    schema: &str,
    object: &str,
    privileges: impl IntoIterator<Item = &'a Privilege>,
    role: &str,
) -> Statement {
    Statement::new(format!(
        "GRANT {} ON {} {} TO {}",
        privilege_list(privileges),
        object_type.keyword(),
        qualified_object(object_type, schema, object),
        quote_identifier(role)
    ))
}

pub fn revoke_on_object<'a>(
    object_type: GrantObjectType,
    schema: &str,
    object: &str,
    privileges: impl IntoIterator<Item = &'a Privilege>,
    role: &str,
) -> Statement {
    Statement::new(format!(
        "REVOKE {} ON {} {} FROM {}",
        privilege_list(privileges),
        object_type.keyword(),
        qualified_object(object_type, schema, object),
        quote_identifier(role)
    ))
}

fn default_privileges_prefix(owner: &str, schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {} IN SCHEMA {}",
            quote_identifier(owner),
            quote_identifier(schema)
        ),
        None => format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {}",
            quote_identifier(owner)
        ),
    }
}

pub fn grant_default_privileges<'a>(
    owner: &str,
    schema: Option<&str>,
    object_type: DefaultPrivilegeObjectType,
    privileges: impl IntoIterator<Item = &'a Privilege>,
    role: &str,
) -> Statement {
    Statement::new(format!(
        "{} GRANT {} ON {} TO {}",
        default_privileges_prefix(owner, schema),
        privilege_list(privileges),
        object_type.keyword(),
        quote_identifier(role)
    ))
}

pub fn revoke_default_privileges<'a>(
    owner: &str,
    schema: Option<&str>,
    object_type: DefaultPrivilegeObjectType,
    privileges: impl IntoIterator<Item = &'a Privilege>,
    role: &str,
) -> Statement {
    Statement::new(format!(
        "{} REVOKE {} ON {} FROM {}",
        default_privileges_prefix(owner, schema),
        privilege_list(privileges),
        object_type.keyword(),
        quote_identifier(role)
    ))
}
