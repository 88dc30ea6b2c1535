//! Role planner
//!
//! A role converges when its login state, password, attributes, memberships
//! and comment all match. Attribute or membership drift is repaired with a
//! single `ALTER ROLE` that re-asserts every attribute, followed by the
//! membership grants and revokes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::crd::{RoleFlags, RoleSpec};
use crate::diff::{Plan, Rejection, SetDiff};
use crate::resources::catalog::RoleState;
use crate::resources::password::password_matches;
use crate::resources::sql::{self, PasswordChange, RoleOptions};

/// Sort names case-insensitively and drop duplicates
///
/// Role names are case-sensitive on the server, so `Admin` and `admin` both
/// survive; only their order is case-insensitive.
pub fn canonical_members(names: &[String]) -> Vec<String> {
    let mut names: Vec<String> = names.to_vec();
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names.dedup();
    names
}

/// Parse `validUntil`; `None` means the role never expires
pub fn parse_valid_until(value: Option<&str>) -> Result<Option<DateTime<Utc>>, Rejection> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| Rejection(format!("Invalid flags.validUntil {v}: {e}")))
        })
        .transpose()
}

fn same_instant(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    // the server keeps microseconds
    a.map(|ts| ts.timestamp_micros()) == b.map(|ts| ts.timestamp_micros())
}

fn normalized_comment(comment: Option<&str>) -> Option<&str> {
    comment.filter(|c| !c.trim().is_empty())
}

fn to_set(names: &[String]) -> BTreeSet<String> {
    names.iter().cloned().collect()
}

fn options<'a>(
    flags: &RoleFlags,
    login: bool,
    password: PasswordChange<'a>,
    valid_until: Option<DateTime<Utc>>,
) -> RoleOptions<'a> {
    RoleOptions {
        login,
        password,
        superuser: flags.superuser,
        createdb: flags.createdb,
        createrole: flags.createrole,
        inherit: flags.inherit,
        replication: flags.replication,
        bypassrls: flags.bypassrls,
        connection_limit: flags.connection_limit,
        valid_until,
    }
}

fn attributes_match(flags: &RoleFlags, valid_until: Option<DateTime<Utc>>, current: &RoleState) -> bool {
    flags.superuser == current.superuser
        && flags.createdb == current.createdb
        && flags.createrole == current.createrole
        && flags.inherit == current.inherit
        && flags.replication == current.replication
        && flags.bypassrls == current.bypassrls
        && flags.connection_limit == current.connection_limit
        && same_instant(valid_until, current.valid_until)
}

/// Plan the role described by `spec`
///
/// `password` is the cleartext password from the referenced Secret, if any;
/// `current` is `None` when the role does not exist yet.
pub fn plan(
    spec: &RoleSpec,
    password: Option<&str>,
    current: Option<&RoleState>,
) -> Result<Plan, Rejection> {
    let name = spec.name.as_str();
    let flags = &spec.flags;
    let login_expected = spec.password_secret_ref.is_some();
    let valid_until = parse_valid_until(flags.valid_until.as_deref())?;
    let in_role = canonical_members(&flags.in_role);
    let members = canonical_members(&flags.role);
    let comment = normalized_comment(spec.comment.as_deref());

    let Some(current) = current else {
        let password = match password {
            Some(password) if login_expected => PasswordChange::Set(password),
            _ => PasswordChange::Keep,
        };
        let mut statements = vec![sql::create_role(
            name,
            &options(flags, login_expected, password, valid_until),
            &in_role,
            &members,
        )];
        if let Some(comment) = comment {
            statements.push(sql::comment_on_role(name, Some(comment)));
        }
        return Ok(Plan::new(statements, None));
    };

    let login_matches = current.login == login_expected;
    let password_ok = match password {
        Some(password) if login_expected => {
            password_matches(current.password_verifier.as_deref(), password, name)
        }
        _ => true,
    };
    let parents = SetDiff::between(&to_set(&current.in_role), &to_set(&in_role));
    let children = SetDiff::between(&to_set(&current.members), &to_set(&members));
    let attributes_ok = attributes_match(flags, valid_until, current);
    let flags_ok = attributes_ok && parents.is_empty() && children.is_empty();
    let comment_ok = comment == normalized_comment(current.comment.as_deref());

    if login_matches && password_ok && flags_ok && comment_ok {
        return Ok(Plan::default());
    }

    let mut statements = Vec::new();
    let mut changed = Vec::new();

    if !login_matches || !password_ok || !flags_ok {
        let password_change = match password {
            _ if !login_expected => PasswordChange::Clear,
            Some(password) if !password_ok => PasswordChange::Set(password),
            _ => PasswordChange::Keep,
        };
        statements.push(sql::alter_role(
            name,
            &options(flags, login_expected, password_change, valid_until),
        ));
    }
    if !login_matches {
        changed.push("login");
    }
    if !password_ok {
        changed.push("password");
    }
    if !attributes_ok {
        changed.push("flags");
    }

    if !flags_ok {
        for parent in &parents.to_revoke {
            statements.push(sql::revoke_membership(parent, name));
        }
        for parent in &parents.to_grant {
            statements.push(sql::grant_membership(parent, name));
        }
        for member in &children.to_revoke {
            statements.push(sql::revoke_membership(name, member));
        }
        for member in &children.to_grant {
            statements.push(sql::grant_membership(name, member));
        }
        if !(parents.is_empty() && children.is_empty()) {
            changed.push("membership");
        }
    }

    if !comment_ok {
        statements.push(sql::comment_on_role(name, comment));
        changed.push("comment");
    }

    let message = format!("Role updated [changed={}]", changed.join(", "));
    Ok(Plan::new(statements, Some(message)))
}
