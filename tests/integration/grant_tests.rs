//! Grant and DefaultPrivilege convergence against a live server

use std::collections::BTreeSet;

use pg_object_operator::crd::{DefaultPrivilegeObjectType, GrantSpec, Privilege};
use pg_object_operator::diff::owned_object::{self, OwnedObjectKind};
use pg_object_operator::diff::privileges::{
    GrantObservation, plan_default_privileges, plan_grant, revoke_all_default_privileges,
    revoke_all_grants,
};
use pg_object_operator::diff::role;
use pg_object_operator::resources::apply_statements;
use pg_object_operator::resources::catalog::{
    default_privileges, object_ownership, object_privileges, schema_owner,
};
use pg_object_operator::resources::sql::quote_identifier;
use tokio_postgres::Client;

use crate::common::*;
use crate::*;

/// Roles and a schema owned by `owner`, torn down by [`Fixture::teardown`]
struct Fixture {
    database: String,
    owner: String,
    reader: String,
    schema: String,
}

impl Fixture {
    async fn setup(client: &Client) -> Self {
        let fixture = Self {
            database: current_database(client).await,
            owner: unique_name("owner"),
            // mixed case exercises identifier quoting in catalog lookups
            reader: unique_name("Reader"),
            schema: unique_name("sch"),
        };

        for name in [&fixture.owner, &fixture.reader] {
            let spec = RoleBuilder::new(name).spec();
            apply(client, &role::plan(&spec, None, None).unwrap()).await;
        }
        let schema = owned_object::plan(
            OwnedObjectKind::Schema,
            &fixture.schema,
            Some(fixture.owner.as_str()),
            None,
        );
        apply(client, &schema).await;
        assert_eq!(
            schema_owner(client, &fixture.schema).await.unwrap(),
            Some(fixture.owner.clone())
        );
        fixture
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(name))
    }

    async fn observe(&self, client: &Client, spec: &GrantSpec) -> GrantObservation {
        let strategy = spec.object_type.catalog_strategy();
        GrantObservation {
            ownership: object_ownership(
                client,
                strategy,
                &spec.database,
                spec.schema_name(),
                &spec.objects,
                &spec.role,
            )
            .await
            .unwrap(),
            current: object_privileges(
                client,
                strategy,
                &spec.database,
                spec.schema_name(),
                &spec.role,
            )
            .await
            .unwrap(),
        }
    }

    async fn teardown(self, client: &Client) {
        drop_schema_cascade(client, &self.schema).await;
        client
            .batch_execute(&format!(
                "DROP OWNED BY {}, {}",
                quote_identifier(&self.owner),
                quote_identifier(&self.reader)
            ))
            .await
            .unwrap();
        drop_roles(client, &[self.reader.as_str(), self.owner.as_str()]).await;
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_table_grant_lifecycle() {
    let client = connect().await;
    let version = server_version(&client).await;
    let fx = Fixture::setup(&client).await;

    client
        .batch_execute(&format!(
            "CREATE TABLE {users} (id int); CREATE TABLE {orders} (id int); \
             ALTER TABLE {orders} OWNER TO {reader}",
            users = fx.table("users"),
            orders = fx.table("orders"),
            reader = quote_identifier(&fx.reader),
        ))
        .await
        .unwrap();

    let spec = GrantBuilder::tables(&fx.database, &fx.reader, &fx.schema)
        .with_privileges(&[Privilege::Select, Privilege::Insert])
        .spec();

    // every table in the schema, except the one the grantee owns
    let observed = fx.observe(&client, &spec).await;
    assert_eq!(observed.ownership.get("orders"), Some(&true));
    assert_eq!(observed.ownership.get("users"), Some(&false));

    let plan = plan_grant(&spec, "apps/tables", version, &observed).unwrap();
    assert_eq!(plan.statements.len(), 1);
    assert!(plan.message.as_deref().unwrap().contains("\"orders\""));
    apply(&client, &plan).await;

    let observed = fx.observe(&client, &spec).await;
    assert!(
        plan_grant(&spec, "apps/tables", version, &observed)
            .unwrap()
            .is_converged()
    );

    // narrowing the privilege list revokes the rest
    let narrowed = GrantBuilder::tables(&fx.database, &fx.reader, &fx.schema)
        .with_privileges(&[Privilege::Select])
        .spec();
    let plan = plan_grant(&narrowed, "apps/tables", version, &observed).unwrap();
    apply(&client, &plan).await;
    let observed = fx.observe(&client, &narrowed).await;
    assert_eq!(
        observed.current.get("users").map(|set| set.len()),
        Some(1)
    );

    // deletion revokes whatever is left
    apply_statements(&client, &revoke_all_grants(&narrowed, &observed.current))
        .await
        .unwrap();
    assert!(fx.observe(&client, &narrowed).await.current.is_empty());

    fx.teardown(&client).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_missing_objects_block_grant() {
    let client = connect().await;
    let version = server_version(&client).await;
    let fx = Fixture::setup(&client).await;

    client
        .batch_execute(&format!("CREATE TABLE {} (id int)", fx.table("users")))
        .await
        .unwrap();

    let spec = GrantBuilder::tables(&fx.database, &fx.reader, &fx.schema)
        .with_objects(&["users", "ghost"])
        .with_privileges(&[Privilege::Select])
        .spec();
    let observed = fx.observe(&client, &spec).await;
    let rejection = plan_grant(&spec, "apps/tables", version, &observed).unwrap_err();
    assert!(rejection.to_string().contains("\"ghost\""));
    assert!(!rejection.to_string().contains("\"users\""));

    fx.teardown(&client).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_schema_grant_converges() {
    let client = connect().await;
    let version = server_version(&client).await;
    let fx = Fixture::setup(&client).await;

    let spec = GrantBuilder::schema(&fx.database, &fx.reader, &fx.schema)
        .with_privileges(&[Privilege::Usage])
        .spec();
    let plan = plan_grant(&spec, "apps/schema", version, &fx.observe(&client, &spec).await)
        .unwrap();
    assert_eq!(plan.statements.len(), 1);
    apply(&client, &plan).await;

    let observed = fx.observe(&client, &spec).await;
    assert!(
        plan_grant(&spec, "apps/schema", version, &observed)
            .unwrap()
            .is_converged()
    );

    fx.teardown(&client).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (PG_TEST_URL)"]
async fn test_default_privileges_converge() {
    let client = connect().await;
    let version = server_version(&client).await;
    let fx = Fixture::setup(&client).await;

    let mut spec = default_privilege_spec(
        DefaultPrivilegeObjectType::Table,
        Some(fx.schema.as_str()),
        &[Privilege::Select, Privilege::Update],
    );
    spec.database = fx.database.clone();
    spec.owner = fx.owner.clone();
    spec.role = fx.reader.clone();

    let current = default_privileges(
        &client,
        &fx.owner,
        Some(fx.schema.as_str()),
        DefaultPrivilegeObjectType::Table,
        &fx.reader,
    )
    .await
    .unwrap();
    assert!(current.is_empty());

    let plan = plan_default_privileges(&spec, "apps/defaults", version, &current).unwrap();
    apply(&client, &plan).await;

    let current = default_privileges(
        &client,
        &fx.owner,
        Some(fx.schema.as_str()),
        DefaultPrivilegeObjectType::Table,
        &fx.reader,
    )
    .await
    .unwrap();
    assert_eq!(current, BTreeSet::from([Privilege::Select, Privilege::Update]));
    assert!(
        plan_default_privileges(&spec, "apps/defaults", version, &current)
            .unwrap()
            .is_converged()
    );

    apply_statements(&client, &revoke_all_default_privileges(&spec, &current))
        .await
        .unwrap();
    let current = default_privileges(
        &client,
        &fx.owner,
        Some(fx.schema.as_str()),
        DefaultPrivilegeObjectType::Table,
        &fx.reader,
    )
    .await
    .unwrap();
    assert!(current.is_empty());

    fx.teardown(&client).await;
}
