//! Unit tests for the per-kind reconciler wiring that needs no server

use std::time::Duration;

use pg_object_operator::controller::ManagedResource;
use pg_object_operator::crd::{
    Database, DefaultPrivilege, DefaultPrivilegeObjectType, Grant, Privilege, ReclaimPolicy, Role,
};

use crate::common::*;

#[test]
fn test_kinds_and_requeue() {
    assert_eq!(Database::KIND, "Database");
    assert_eq!(Role::KIND, "Role");
    assert_eq!(Grant::KIND, "Grant");
    assert_eq!(DefaultPrivilege::KIND, "DefaultPrivilege");
    assert_eq!(Grant::ERROR_REQUEUE, Duration::from_secs(60));
}

#[test]
fn test_database_drops_only_with_delete_policy() {
    let retained = database("orders", Some("orders_owner"), ReclaimPolicy::Retain);
    let deleted = database("orders", Some("orders_owner"), ReclaimPolicy::Delete);

    assert!(!retained.drops_on_delete());
    assert!(deleted.drops_on_delete());
    assert_eq!(deleted.target_database(), None);
    assert_eq!(deleted.display_name(), "orders");
    assert_eq!(deleted.qualified_name(), "apps/orders");
}

#[test]
fn test_role_always_drops() {
    let role = RoleBuilder::new("app_user").with_login("app-user-password").build();
    assert!(role.drops_on_delete());
    assert_eq!(role.target_database(), None);
    assert_eq!(role.cluster_ref().name, TEST_CLUSTER);
    assert!(role.references_secret("app-user-password", Some(TEST_NAMESPACE)));
}

#[test]
fn test_grant_reports_statement_summary() {
    let grant = GrantBuilder::tables("app", "reader", "public")
        .with_objects(&["users"])
        .with_privileges(&[Privilege::Select])
        .build("reader-users");

    assert_eq!(
        grant.display_name(),
        r#"SELECT ON TABLE "public"."users" TO "reader""#
    );
    assert_eq!(grant.target_database(), Some("app"));
    assert!(grant.preflight(&grant.qualified_name()).is_ok());
}

#[test]
fn test_grant_preflight_rejects_illegal_privileges() {
    let grant = GrantBuilder::database("app", "reader")
        .with_privileges(&[Privilege::Select])
        .build("reader-db");

    let rejection = grant.preflight(&grant.qualified_name()).unwrap_err();
    assert!(rejection.to_string().contains("[resource=apps/reader-db, objectType=database"));
}

#[test]
fn test_default_privilege_preflight() {
    let spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Table,
        Some("public"),
        &[Privilege::Select],
    );
    let defaults = default_privilege("reader-defaults", spec);

    assert!(defaults.preflight(&defaults.qualified_name()).is_ok());
    assert_eq!(defaults.target_database(), Some("app"));
    assert_eq!(
        defaults.display_name(),
        r#"FOR ROLE "app_owner" IN SCHEMA "public" SELECT ON TABLES TO "reader""#
    );
}
