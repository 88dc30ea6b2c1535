//! Grant and DefaultPrivilege planners
//!
//! Both kinds own the complete privilege set their grantee holds within their
//! scope. Planning always revokes before it grants, and a rejected plan never
//! carries statements.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::crd::{
    DefaultPrivilegeSpec, GrantObjectType, GrantSpec, Privilege, format_privilege_list,
};
use crate::diff::{Plan, Rejection, SetDiff};
use crate::resources::catalog::ObjectPrivileges;
use crate::resources::sql::{self, Statement, quote_identifier};

// =============================================================================
// Validation
// =============================================================================

/// Reject privileges that are not legal for the object type
pub fn check_legal_privileges(
    kind: &str,
    resource: &str,
    object_type: impl Display,
    declared: &[Privilege],
    legal: &[Privilege],
) -> Result<(), Rejection> {
    let invalid: BTreeSet<&Privilege> = declared
        .iter()
        .filter(|privilege| !legal.contains(privilege))
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }

    Err(Rejection(format!(
        "{kind} contains invalid privileges for the specified objectType. \
         [resource={resource}, objectType={object_type}, invalidPrivileges={}, allowedPrivilegesForObjectType={}]",
        format_privilege_list(invalid),
        format_privilege_list(legal)
    )))
}

/// Reject privileges the connected server is too old for
pub fn check_server_version(
    resource: &str,
    server_version: u32,
    declared: &[Privilege],
) -> Result<(), Rejection> {
    let too_new: BTreeMap<&str, u32> = declared
        .iter()
        .filter_map(|privilege| {
            privilege
                .minimum_server_version()
                .filter(|required| *required > server_version)
                .map(|required| (privilege.as_sql(), required))
        })
        .collect();
    if too_new.is_empty() {
        return Ok(());
    }

    let rendered: Vec<String> = too_new
        .iter()
        .map(|(privilege, version)| format!("{privilege}={version}"))
        .collect();
    Err(Rejection(format!(
        "The following privileges require a newer PostgreSQL version (current: {server_version}): {{{}}} [resource={resource}]",
        rendered.join(", ")
    )))
}

fn check_common(
    kind: &str,
    resource: &str,
    schema: Option<&str>,
    needs_schema: bool,
    object_type: impl Display,
    privileges: &[Privilege],
) -> Result<(), Rejection> {
    if privileges.is_empty() {
        return Err(Rejection(format!(
            "{kind} does not list any privileges [resource={resource}]"
        )));
    }
    if needs_schema && schema.is_none_or(|schema| schema.trim().is_empty()) {
        return Err(Rejection(format!(
            "{kind} requires a schema for objectType {object_type} [resource={resource}]"
        )));
    }
    Ok(())
}

/// Validation of a Grant that needs no server
pub fn validate_grant(spec: &GrantSpec, resource: &str) -> Result<(), Rejection> {
    check_common(
        "Grant",
        resource,
        spec.schema.as_deref(),
        spec.object_type != GrantObjectType::Database,
        spec.object_type,
        &spec.privileges,
    )?;
    check_legal_privileges(
        "Grant",
        resource,
        spec.object_type,
        &spec.privileges,
        spec.object_type.legal_privileges(),
    )
}

/// Validation of a DefaultPrivilege that needs no server
pub fn validate_default_privilege(
    spec: &DefaultPrivilegeSpec,
    resource: &str,
) -> Result<(), Rejection> {
    check_common(
        "DefaultPrivilege",
        resource,
        spec.schema.as_deref(),
        spec.object_type.is_schema_scoped(),
        spec.object_type,
        &spec.privileges,
    )?;
    check_legal_privileges(
        "DefaultPrivilege",
        resource,
        spec.object_type,
        &spec.privileges,
        spec.object_type.legal_privileges(),
    )
}

// =============================================================================
// Grant
// =============================================================================

/// What the catalog reports for a Grant's scope
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GrantObservation {
    /// Existing objects in scope and whether the grantee owns them
    pub ownership: BTreeMap<String, bool>,
    /// Privileges the grantee currently holds in scope
    pub current: ObjectPrivileges,
}

impl GrantSpec {
    /// Objects named by this Grant, `None` when it covers every object in its schema
    pub fn explicit_targets(&self) -> Option<Vec<String>> {
        match self.object_type {
            GrantObjectType::Database => Some(vec![self.database.clone()]),
            GrantObjectType::Schema => Some(vec![self.schema_name().to_string()]),
            GrantObjectType::Table | GrantObjectType::Sequence if self.objects.is_empty() => None,
            GrantObjectType::Table | GrantObjectType::Sequence => {
                let unique: BTreeSet<&String> = self.objects.iter().collect();
                Some(unique.into_iter().cloned().collect())
            }
        }
    }

    /// Object names as rendered in status messages
    fn display_object(&self, object: &str) -> String {
        if self.object_type.is_schema_qualified() {
            format!(
                "{}.{}",
                quote_identifier(self.schema_name()),
                quote_identifier(object)
            )
        } else {
            quote_identifier(object)
        }
    }

    /// One object per line, the first directly under the summary
    fn bullet_list<'a>(&self, objects: impl IntoIterator<Item = &'a String>) -> String {
        let lines: Vec<String> = objects
            .into_iter()
            .map(|object| self.display_object(object))
            .collect();
        format!("\n{}", lines.join("\n  • "))
    }
}

/// Plan the privileges of a Grant against the observed catalog
pub fn plan_grant(
    spec: &GrantSpec,
    resource: &str,
    server_version: u32,
    observed: &GrantObservation,
) -> Result<Plan, Rejection> {
    check_server_version(resource, server_version, &spec.privileges)?;

    let targets: Vec<String> = match spec.explicit_targets() {
        Some(targets) => targets,
        None => observed.ownership.keys().cloned().collect(),
    };

    let missing: Vec<&String> = targets
        .iter()
        .filter(|target| !observed.ownership.contains_key(*target))
        .collect();
    if !missing.is_empty() {
        return Err(Rejection(format!(
            "Did not grant or revoke any privileges as the listed {} objects do not exist [resource={resource}]{}",
            spec.object_type,
            spec.bullet_list(missing)
        )));
    }

    let owned: Vec<&String> = targets
        .iter()
        .filter(|target| observed.ownership.get(*target).copied().unwrap_or(false))
        .collect();

    let desired: BTreeSet<Privilege> = spec.privileges.iter().copied().collect();
    let empty = BTreeSet::new();
    let schema = spec.schema_name();
    let mut statements = Vec::new();

    for target in targets.iter().filter(|target| !owned.contains(target)) {
        let current = observed.current.get(target).unwrap_or(&empty);
        let diff = SetDiff::between(current, &desired);
        if !diff.to_revoke.is_empty() {
            statements.push(sql::revoke_on_object(
                spec.object_type,
                schema,
                target,
                &diff.to_revoke,
                &spec.role,
            ));
        }
        if !diff.to_grant.is_empty() {
            statements.push(sql::grant_on_object(
                spec.object_type,
                schema,
                target,
                &diff.to_grant,
                &spec.role,
            ));
        }
    }

    // privileges left behind on objects this Grant no longer names
    for (object, privileges) in &observed.current {
        if !targets.contains(object) && !privileges.is_empty() {
            statements.push(sql::revoke_on_object(
                spec.object_type,
                schema,
                object,
                privileges,
                &spec.role,
            ));
        }
    }

    let message = (!owned.is_empty()).then(|| {
        format!(
            "The role is the owner of the listed {} objects and thus we did not need to grant or revoke any privileges from them. [resource={resource}]{}",
            spec.object_type,
            spec.bullet_list(owned.iter().copied())
        )
    });

    Ok(Plan::new(statements, message))
}

/// Revoke everything the grantee currently holds in the Grant's scope
pub fn revoke_all_grants(spec: &GrantSpec, current: &ObjectPrivileges) -> Vec<Statement> {
    current
        .iter()
        .filter(|(_, privileges)| !privileges.is_empty())
        .map(|(object, privileges)| {
            sql::revoke_on_object(
                spec.object_type,
                spec.schema_name(),
                object,
                privileges,
                &spec.role,
            )
        })
        .collect()
}

// =============================================================================
// DefaultPrivilege
// =============================================================================

/// Plan the default privileges against the set currently recorded
pub fn plan_default_privileges(
    spec: &DefaultPrivilegeSpec,
    resource: &str,
    server_version: u32,
    current: &BTreeSet<Privilege>,
) -> Result<Plan, Rejection> {
    check_server_version(resource, server_version, &spec.privileges)?;

    let desired: BTreeSet<Privilege> = spec.privileges.iter().copied().collect();
    let diff = SetDiff::between(current, &desired);
    let mut statements = Vec::new();

    if !diff.to_revoke.is_empty() {
        statements.push(sql::revoke_default_privileges(
            &spec.owner,
            spec.scoped_schema(),
            spec.object_type,
            &diff.to_revoke,
            &spec.role,
        ));
    }
    if !diff.to_grant.is_empty() {
        statements.push(sql::grant_default_privileges(
            &spec.owner,
            spec.scoped_schema(),
            spec.object_type,
            &diff.to_grant,
            &spec.role,
        ));
    }

    Ok(Plan::new(statements, None))
}

/// Revoke every default privilege currently recorded for the grantee
pub fn revoke_all_default_privileges(
    spec: &DefaultPrivilegeSpec,
    current: &BTreeSet<Privilege>,
) -> Vec<Statement> {
    if current.is_empty() {
        return Vec::new();
    }
    vec![sql::revoke_default_privileges(
        &spec.owner,
        spec.scoped_schema(),
        spec.object_type,
        current,
        &spec.role,
    )]
}
