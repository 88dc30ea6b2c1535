//! Role convergence against a live server

use chrono::{DateTime, Utc};
use pg_object_operator::crd::RoleFlags;
use pg_object_operator::diff::role::plan;
use pg_object_operator::resources::catalog::role_state;
use pg_object_operator::resources::password::password_matches;
use pg_object_operator::resources::sql::quote_identifier;

use crate::common::*;
use crate::*;

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_login_role_converges_and_rotates_password() {
    let client = connect().await;
    let name = unique_name("login");
    let spec = RoleBuilder::new(&name)
        .with_login("login-password")
        .with_comment("integration test")
        .spec();

    let created = plan(&spec, Some("first-secret"), None).unwrap();
    apply(&client, &created).await;

    let state = role_state(&client, &name).await.unwrap().unwrap();
    assert!(state.login);
    assert_eq!(state.comment.as_deref(), Some("integration test"));
    assert!(password_matches(
        state.password_verifier.as_deref(),
        "first-secret",
        &name
    ));
    assert!(plan(&spec, Some("first-secret"), Some(&state)).unwrap().is_converged());

    let rotated = plan(&spec, Some("second-secret"), Some(&state)).unwrap();
    assert_eq!(
        rotated.message.as_deref(),
        Some("Role updated [changed=password]")
    );
    apply(&client, &rotated).await;

    let state = role_state(&client, &name).await.unwrap().unwrap();
    assert!(password_matches(
        state.password_verifier.as_deref(),
        "second-secret",
        &name
    ));
    assert!(plan(&spec, Some("second-secret"), Some(&state)).unwrap().is_converged());

    drop_roles(&client, &[name.as_str()]).await;
    assert!(role_state(&client, &name).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_memberships_and_flags_converge() {
    let client = connect().await;
    let group = unique_name("Group");
    let member = unique_name("member");
    let name = unique_name("app");

    let group_spec = RoleBuilder::new(&group).spec();
    apply(&client, &plan(&group_spec, None, None).unwrap()).await;
    let member_spec = RoleBuilder::new(&member).spec();
    apply(&client, &plan(&member_spec, None, None).unwrap()).await;

    let flags = RoleFlags {
        createdb: true,
        connection_limit: 5,
        valid_until: Some("2099-12-31T23:59:59.123456Z".to_string()),
        ..RoleFlags::default()
    };
    let spec = RoleBuilder::new(&name)
        .with_flags(flags)
        .with_in_role(&[group.as_str()])
        .with_members(&[member.as_str()])
        .spec();
    apply(&client, &plan(&spec, None, None).unwrap()).await;

    let state = role_state(&client, &name).await.unwrap().unwrap();
    assert_eq!(state.in_role, vec![group.clone()]);
    assert_eq!(state.members, vec![member.clone()]);
    assert!(state.createdb);
    assert_eq!(state.connection_limit, 5);
    assert!(plan(&spec, None, Some(&state)).unwrap().is_converged());

    // dropping the membership is repaired on the next pass
    let spec_without_member = RoleBuilder::new(&name)
        .with_flags(spec.flags.clone())
        .with_members(&[])
        .spec();
    let repair = plan(&spec_without_member, None, Some(&state)).unwrap();
    apply(&client, &repair).await;
    let state = role_state(&client, &name).await.unwrap().unwrap();
    assert!(state.members.is_empty());
    assert!(
        plan(&spec_without_member, None, Some(&state))
            .unwrap()
            .is_converged()
    );

    drop_roles(&client, &[name.as_str(), member.as_str(), group.as_str()]).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_expired_role_is_observed_and_repaired() {
    let client = connect().await;
    let name = unique_name("expired");
    client
        .batch_execute(&format!(
            "CREATE ROLE {} VALID UNTIL '-infinity'",
            quote_identifier(&name)
        ))
        .await
        .unwrap();

    let state = role_state(&client, &name).await.unwrap().unwrap();
    assert_eq!(state.valid_until, Some(DateTime::<Utc>::MIN_UTC));

    let spec = RoleBuilder::new(&name).spec();
    let repair = plan(&spec, None, Some(&state)).unwrap();
    assert!(!repair.is_converged());
    apply(&client, &repair).await;

    let state = role_state(&client, &name).await.unwrap().unwrap();
    assert_eq!(state.valid_until, None);
    assert!(plan(&spec, None, Some(&state)).unwrap().is_converged());

    drop_roles(&client, &[name.as_str()]).await;
}
