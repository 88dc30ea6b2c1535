//! Planner for objects that only have existence and an owner (databases, schemas)

use crate::diff::Plan;
use crate::resources::sql::{self, Statement};

/// Kind of owned object being planned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnedObjectKind {
    Database,
    Schema,
}

impl OwnedObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnedObjectKind::Database => "Database",
            OwnedObjectKind::Schema => "Schema",
        }
    }

    fn create(&self, name: &str) -> Statement {
        match self {
            OwnedObjectKind::Database => sql::create_database(name),
            OwnedObjectKind::Schema => sql::create_schema(name),
        }
    }

    fn alter_owner(&self, name: &str, owner: &str) -> Statement {
        match self {
            OwnedObjectKind::Database => sql::alter_database_owner(name, owner),
            OwnedObjectKind::Schema => sql::alter_schema_owner(name, owner),
        }
    }

    pub fn drop(&self, name: &str) -> Statement {
        match self {
            OwnedObjectKind::Database => sql::drop_database(name),
            OwnedObjectKind::Schema => sql::drop_schema(name),
        }
    }
}

/// Plan existence and ownership of `name`
///
/// `current_owner` is `None` when the object does not exist. An undeclared
/// owner leaves whatever owner the object has alone.
pub fn plan(
    kind: OwnedObjectKind,
    name: &str,
    declared_owner: Option<&str>,
    current_owner: Option<&str>,
) -> Plan {
    let Some(current_owner) = current_owner else {
        let mut statements = vec![kind.create(name)];
        if let Some(owner) = declared_owner {
            statements.push(kind.alter_owner(name, owner));
        }
        return Plan::new(statements, None);
    };

    match declared_owner {
        Some(owner) if owner != current_owner => Plan::new(
            vec![kind.alter_owner(name, owner)],
            Some(format!(
                "{} owner changed [previousOwner={}, newOwner={}]",
                kind.as_str(),
                current_owner,
                owner
            )),
        ),
        _ => Plan::default(),
    }
}
