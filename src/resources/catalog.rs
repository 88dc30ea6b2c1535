//! Read-only queries against the PostgreSQL system catalogs
//!
//! Every observation the diff planners work from comes from here. Names are
//! always passed as parameters. Values cast through `$n::text::regrole` or
//! `::regnamespace` are quoted first, since those casts fold unquoted names to
//! lower case; a missing role or schema surfaces as a query error rather than
//! an empty result.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tokio_postgres::GenericClient;
use tokio_postgres::types::{Timestamp, ToSql};

use crate::crd::{CatalogStrategy, DefaultPrivilegeObjectType, Privilege};
use crate::resources::sql::{quote_identifier, quote_literal};

pub type CatalogResult<T> = Result<T, tokio_postgres::Error>;

/// Privileges a role holds, keyed by object name
pub type ObjectPrivileges = BTreeMap<String, BTreeSet<Privilege>>;

/// Owner of a database, `None` when the database does not exist
pub async fn database_owner<C>(client: &C, name: &str) -> CatalogResult<Option<String>>
where
    C: GenericClient + Sync,
{
    let row = client
        .query_opt(
            "select pg_get_userbyid(d.datdba)::text as owner from pg_catalog.pg_database d where d.datname = $1",
            &[&name],
        )
        .await?;
    Ok(row.map(|row| row.get("owner")))
}

/// Owner of a schema in the connected database, `None` when it does not exist
pub async fn schema_owner<C>(client: &C, name: &str) -> CatalogResult<Option<String>>
where
    C: GenericClient + Sync,
{
    let row = client
        .query_opt(
            "select pg_get_userbyid(n.nspowner)::text as owner from pg_catalog.pg_namespace n where n.nspname = $1",
            &[&name],
        )
        .await?;
    Ok(row.map(|row| row.get("owner")))
}

/// Observed attributes of an existing role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleState {
    pub login: bool,
    pub superuser: bool,
    pub createdb: bool,
    pub createrole: bool,
    pub inherit: bool,
    pub replication: bool,
    pub bypassrls: bool,
    pub connection_limit: i32,
    /// `None` means the role never expires; `-infinity` reads as the earliest instant
    pub valid_until: Option<DateTime<Utc>>,
    pub password_verifier: Option<String>,
    pub comment: Option<String>,
    /// Roles this role is a member of
    pub in_role: Vec<String>,
    /// Roles that are members of this role
    pub members: Vec<String>,
}

/// Read a role from `pg_authid`, `None` when it does not exist
pub async fn role_state<C>(client: &C, name: &str) -> CatalogResult<Option<RoleState>>
where
    C: GenericClient + Sync,
{
    let Some(row) = client
        .query_opt(
            r#"
            select
                a.rolcanlogin,
                a.rolsuper,
                a.rolcreatedb,
                a.rolcreaterole,
                a.rolinherit,
                a.rolreplication,
                a.rolbypassrls,
                a.rolconnlimit,
                a.rolvaliduntil,
                a.rolpassword,
                shobj_description(a.oid, 'pg_authid') as comment
            from pg_catalog.pg_authid a
            where a.rolname = $1
            "#,
            &[&name],
        )
        .await?
    else {
        return Ok(None);
    };

    let in_role: Vec<String> = client
        .query(
            r#"
            select distinct g.rolname::text as name
            from pg_catalog.pg_auth_members m
            join pg_catalog.pg_roles g on g.oid = m.roleid
            join pg_catalog.pg_roles r on r.oid = m.member
            where r.rolname = $1
            order by 1
            "#,
            &[&name],
        )
        .await?
        .iter()
        .map(|row| row.try_get("name"))
        .collect::<CatalogResult<_>>()?;

    let members: Vec<String> = client
        .query(
            r#"
            select distinct r.rolname::text as name
            from pg_catalog.pg_auth_members m
            join pg_catalog.pg_roles g on g.oid = m.roleid
            join pg_catalog.pg_roles r on r.oid = m.member
            where g.rolname = $1
            order by 1
            "#,
            &[&name],
        )
        .await?
        .iter()
        .map(|row| row.try_get("name"))
        .collect::<CatalogResult<_>>()?;

    let valid_until: Option<Timestamp<DateTime<Utc>>> = row.try_get("rolvaliduntil")?;

    Ok(Some(RoleState {
        login: row.try_get("rolcanlogin")?,
        superuser: row.try_get("rolsuper")?,
        createdb: row.try_get("rolcreatedb")?,
        createrole: row.try_get("rolcreaterole")?,
        inherit: row.try_get("rolinherit")?,
        replication: row.try_get("rolreplication")?,
        bypassrls: row.try_get("rolbypassrls")?,
        connection_limit: row.try_get("rolconnlimit")?,
        valid_until: valid_until.and_then(expiry),
        password_verifier: row.try_get("rolpassword")?,
        comment: row.try_get("comment")?,
        in_role,
        members,
    }))
}

/// Map a `rolvaliduntil` value onto an optional instant
///
/// `infinity` never expires. `-infinity` has already expired, so it reads as
/// the earliest representable instant and never matches a declared expiry.
pub fn expiry(value: Timestamp<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match value {
        Timestamp::PosInfinity => None,
        Timestamp::NegInfinity => Some(DateTime::<Utc>::MIN_UTC),
        Timestamp::Value(ts) => Some(ts),
    }
}

fn relkind_list(relkinds: &[&str]) -> String {
    relkinds
        .iter()
        .map(|kind| quote_literal(kind))
        .collect::<Vec<_>>()
        .join(", ")
}

fn collect_privileges(rows: &[tokio_postgres::Row]) -> ObjectPrivileges {
    let mut privileges = ObjectPrivileges::new();
    for row in rows {
        let object: String = row.get("object");
        let privilege_type: String = row.get("privilege_type");
        let entry = privileges.entry(object).or_default();
        // privileges this operator does not manage (SET, ALTER SYSTEM) are ignored
        if let Some(privilege) = Privilege::from_acl(&privilege_type) {
            entry.insert(privilege);
        }
    }
    privileges.retain(|_, set| !set.is_empty());
    privileges
}

/// Privileges `role` currently holds on objects in scope
///
/// The scope is the named database, the named schema, or every relation of the
/// strategy's kinds inside `schema`.
pub async fn object_privileges<C>(
    client: &C,
    strategy: CatalogStrategy,
    database: &str,
    schema: &str,
    role: &str,
) -> CatalogResult<ObjectPrivileges>
where
    C: GenericClient + Sync,
{
    let role = quote_identifier(role);
    let rows = match strategy {
        CatalogStrategy::Database => {
            client
                .query(
                    r#"
                    select d.datname::text as object, a.privilege_type
                    from pg_catalog.pg_database d
                    cross join lateral aclexplode(d.datacl) a
                    where d.datname = $1
                      and a.grantee = $2::text::regrole
                    "#,
                    &[&database, &role],
                )
                .await?
        }
        CatalogStrategy::Namespace => {
            client
                .query(
                    r#"
                    select n.nspname::text as object, a.privilege_type
                    from pg_catalog.pg_namespace n
                    cross join lateral aclexplode(n.nspacl) a
                    where n.nspname = $1
                      and a.grantee = $2::text::regrole
                    "#,
                    &[&schema, &role],
                )
                .await?
        }
        CatalogStrategy::Relation { relkinds } => {
            let schema = quote_identifier(schema);
            let sql = format!(
                r#"
                select c.relname::text as object, a.privilege_type
                from pg_catalog.pg_class c
                cross join lateral aclexplode(c.relacl) a
                where c.relnamespace = $1::text::regnamespace
                  and c.relkind in ({})
                  and a.grantee = $2::text::regrole
                "#,
                relkind_list(relkinds)
            );
            client.query(&sql, &[&schema, &role]).await?
        }
    };

    Ok(collect_privileges(&rows))
}

/// Existing objects in scope and whether `role` owns each of them
///
/// `objects` narrows relation lookups to the listed names; an empty slice
/// returns every relation of the strategy's kinds in `schema`. Names that do
/// not exist are simply absent from the result.
pub async fn object_ownership<C>(
    client: &C,
    strategy: CatalogStrategy,
    database: &str,
    schema: &str,
    objects: &[String],
    role: &str,
) -> CatalogResult<BTreeMap<String, bool>>
where
    C: GenericClient + Sync,
{
    let role = quote_identifier(role);
    let rows = match strategy {
        CatalogStrategy::Database => {
            client
                .query(
                    r#"
                    select d.datname::text as object, (d.datdba = $1::text::regrole) as is_owner
                    from pg_catalog.pg_database d
                    where d.datname = $2
                    "#,
                    &[&role, &database],
                )
                .await?
        }
        CatalogStrategy::Namespace => {
            client
                .query(
                    r#"
                    select n.nspname::text as object, (n.nspowner = $1::text::regrole) as is_owner
                    from pg_catalog.pg_namespace n
                    where n.nspname = $2
                    "#,
                    &[&role, &schema],
                )
                .await?
        }
        CatalogStrategy::Relation { relkinds } => {
            let schema = quote_identifier(schema);
            let mut sql = format!(
                r#"
                select c.relname::text as object, (c.relowner = $1::text::regrole) as is_owner
                from pg_catalog.pg_class c
                where c.relnamespace = $2::text::regnamespace
                  and c.relkind in ({})
                "#,
                relkind_list(relkinds)
            );
            let mut params: Vec<&(dyn ToSql + Sync)> = vec![&role, &schema];
            if !objects.is_empty() {
                sql.push_str("  and c.relname::text = any($3::text[])\n");
                params.push(&objects);
            }
            client.query(&sql, &params).await?
        }
    };

    Ok(rows
        .iter()
        .map(|row| (row.get("object"), row.get("is_owner")))
        .collect())
}

/// Default privileges `owner` hands to `role` for future objects of `object_type`
pub async fn default_privileges<C>(
    client: &C,
    owner: &str,
    schema: Option<&str>,
    object_type: DefaultPrivilegeObjectType,
    role: &str,
) -> CatalogResult<BTreeSet<Privilege>>
where
    C: GenericClient + Sync,
{
    let objtype = quote_literal(object_type.catalog_code());
    let owner = quote_identifier(owner);
    let role = quote_identifier(role);
    let rows = match schema.filter(|_| object_type.is_schema_scoped()) {
        Some(schema) => {
            let schema = quote_identifier(schema);
            let sql = format!(
                r#"
                select a.privilege_type
                from pg_catalog.pg_default_acl d
                cross join lateral aclexplode(d.defaclacl) a
                where d.defaclrole = $1::text::regrole
                  and d.defaclobjtype = {objtype}
                  and d.defaclnamespace = $2::text::regnamespace
                  and a.grantee = $3::text::regrole
                "#
            );
            client.query(&sql, &[&owner, &schema, &role]).await?
        }
        None => {
            let sql = format!(
                r#"
                select a.privilege_type
                from pg_catalog.pg_default_acl d
                cross join lateral aclexplode(d.defaclacl) a
                where d.defaclrole = $1::text::regrole
                  and d.defaclobjtype = {objtype}
                  and a.grantee = $2::text::regrole
                "#
            );
            client.query(&sql, &[&owner, &role]).await?
        }
    };

    Ok(rows
        .iter()
        .filter_map(|row| Privilege::from_acl(row.get::<_, &str>("privilege_type")))
        .collect())
}

/// `SHOW server_version_num` as a major version, e.g. 170002 -> 17
pub fn major_version(server_version_num: &str) -> Option<u32> {
    server_version_num
        .trim()
        .parse::<u32>()
        .ok()
        .map(|num| num / 10_000)
}
