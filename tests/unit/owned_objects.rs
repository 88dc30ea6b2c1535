//! Unit tests for database and schema planning

use pg_object_operator::diff::owned_object::{OwnedObjectKind, plan};
use pg_object_operator::resources::Statement;

fn sql_of(statements: &[Statement]) -> Vec<&str> {
    statements.iter().map(Statement::sql).collect()
}

#[test]
fn test_database_lifecycle() {
    // first pass creates and assigns the owner
    let created = plan(OwnedObjectKind::Database, "orders", Some("orders_owner"), None);
    assert_eq!(
        sql_of(&created.statements),
        vec![
            r#"CREATE DATABASE "orders""#,
            r#"ALTER DATABASE "orders" OWNER TO "orders_owner""#
        ]
    );

    // second pass observes the result and has nothing to do
    let steady = plan(
        OwnedObjectKind::Database,
        "orders",
        Some("orders_owner"),
        Some("orders_owner"),
    );
    assert!(steady.is_converged());
    assert_eq!(steady.message, None);
}

#[test]
fn test_schema_owner_drift_is_reported() {
    let plan = plan(
        OwnedObjectKind::Schema,
        "billing",
        Some("billing_owner"),
        Some("postgres"),
    );
    assert_eq!(
        sql_of(&plan.statements),
        vec![r#"ALTER SCHEMA "billing" OWNER TO "billing_owner""#]
    );
    assert_eq!(
        plan.message.as_deref(),
        Some("Schema owner changed [previousOwner=postgres, newOwner=billing_owner]")
    );
}

#[test]
fn test_undeclared_owner_is_left_alone() {
    assert!(plan(OwnedObjectKind::Schema, "billing", None, Some("whoever")).is_converged());
}

#[test]
fn test_names_are_quoted() {
    let plan = plan(OwnedObjectKind::Database, "Mixed\"Case", None, None);
    assert_eq!(
        sql_of(&plan.statements),
        vec![r#"CREATE DATABASE "Mixed""Case""#]
    );
}

#[test]
fn test_drop_statements() {
    assert_eq!(
        OwnedObjectKind::Database.drop("orders").sql(),
        r#"DROP DATABASE IF EXISTS "orders""#
    );
    assert_eq!(
        OwnedObjectKind::Schema.drop("billing").sql(),
        r#"DROP SCHEMA IF EXISTS "billing""#
    );
}
