//! Unit tests for DefaultPrivilege validation and planning

use std::collections::BTreeSet;

use pg_object_operator::crd::{DefaultPrivilegeObjectType, Privilege};
use pg_object_operator::diff::privileges::{
    plan_default_privileges, revoke_all_default_privileges, validate_default_privilege,
};
use pg_object_operator::resources::Statement;

use crate::common::*;

const RESOURCE: &str = "apps/reader-defaults";

fn sql_of(statements: &[Statement]) -> Vec<&str> {
    statements.iter().map(Statement::sql).collect()
}

fn set(privileges: &[Privilege]) -> BTreeSet<Privilege> {
    privileges.iter().copied().collect()
}

#[test]
fn test_table_defaults_are_granted_in_schema() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Table,
        Some("public"),
        &[Privilege::Select, Privilege::Insert],
    );

    let plan = plan_default_privileges(&spec, RESOURCE, 16, &BTreeSet::new()).unwrap();
    assert_eq!(
        sql_of(&plan.statements),
        vec![
            "ALTER DEFAULT PRIVILEGES FOR ROLE \"app_owner\" IN SCHEMA \"public\" \
             GRANT SELECT, INSERT ON TABLES TO \"reader\""
        ]
    );
}

#[test]
fn test_schema_defaults_ignore_schema() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Schema,
        Some("public"),
        &[Privilege::Usage],
    );

    let plan = plan_default_privileges(&spec, RESOURCE, 16, &BTreeSet::new()).unwrap();
    assert_eq!(
        sql_of(&plan.statements),
        vec![r#"ALTER DEFAULT PRIVILEGES FOR ROLE "app_owner" GRANT USAGE ON SCHEMAS TO "reader""#]
    );
}

#[test]
fn test_drift_revokes_then_grants() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Sequence,
        Some("public"),
        &[Privilege::Usage],
    );
    let current = set(&[Privilege::Select, Privilege::Update]);

    let plan = plan_default_privileges(&spec, RESOURCE, 16, &current).unwrap();
    assert_eq!(
        sql_of(&plan.statements),
        vec![
            "ALTER DEFAULT PRIVILEGES FOR ROLE \"app_owner\" IN SCHEMA \"public\" \
             REVOKE SELECT, UPDATE ON SEQUENCES FROM \"reader\"",
            "ALTER DEFAULT PRIVILEGES FOR ROLE \"app_owner\" IN SCHEMA \"public\" \
             GRANT USAGE ON SEQUENCES TO \"reader\"",
        ]
    );
    assert_eq!(plan.message, None);
}

#[test]
fn test_converged_defaults() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Table,
        Some("public"),
        &[Privilege::Select],
    );
    let plan = plan_default_privileges(&spec, RESOURCE, 16, &set(&[Privilege::Select])).unwrap();
    assert!(plan.is_converged());
}

#[test]
fn test_maintain_defaults_need_postgres_17() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Table,
        Some("public"),
        &[Privilege::Maintain],
    );

    assert!(plan_default_privileges(&spec, RESOURCE, 16, &BTreeSet::new()).is_err());
    assert!(plan_default_privileges(&spec, RESOURCE, 17, &BTreeSet::new()).is_ok());
}

#[test]
fn test_validation() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Sequence,
        Some("public"),
        &[Privilege::Truncate],
    );
    assert_eq!(
        validate_default_privilege(&spec, RESOURCE)
            .unwrap_err()
            .to_string(),
        "DefaultPrivilege contains invalid privileges for the specified objectType. \
         [resource=apps/reader-defaults, objectType=sequence, invalidPrivileges=[TRUNCATE], \
         allowedPrivilegesForObjectType=[USAGE, SELECT, UPDATE]]"
    );

    let spec = default_privilege_spec(DefaultPrivilegeObjectType::Table, None, &[Privilege::Select]);
    assert!(validate_default_privilege(&spec, RESOURCE).is_err());

    let spec = default_privilege_spec(DefaultPrivilegeObjectType::Schema, None, &[Privilege::Usage]);
    assert!(validate_default_privilege(&spec, RESOURCE).is_ok());
}

#[test]
fn test_revoke_all_on_deletion() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Table,
        Some("public"),
        &[Privilege::Select],
    );

    assert!(revoke_all_default_privileges(&spec, &BTreeSet::new()).is_empty());
    assert_eq!(
        sql_of(&revoke_all_default_privileges(
            &spec,
            &set(&[Privilege::Select, Privilege::Trigger])
        )),
        vec![
            "ALTER DEFAULT PRIVILEGES FOR ROLE \"app_owner\" IN SCHEMA \"public\" \
             REVOKE SELECT, TRIGGER ON TABLES FROM \"reader\""
        ]
    );
}
