// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for the diff planners
//!
//! These tests use proptest to generate random declared and observed states
//! and verify that:
//! 1. Applying a plan's set diff always lands on the declared set
//! 2. Member lists are canonical regardless of input order
//! 3. Planning a grant against its own outcome yields no statements
//! 4. Password verification never panics on arbitrary verifiers

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use pg_object_operator::crd::{ClusterRef, GrantObjectType, GrantSpec, Privilege};
use pg_object_operator::diff::SetDiff;
use pg_object_operator::diff::privileges::{GrantObservation, plan_grant};
use pg_object_operator::diff::role::canonical_members;
use pg_object_operator::resources::password::password_matches;

// =============================================================================
// Strategies
// =============================================================================

fn table_privilege() -> impl Strategy<Value = Privilege> {
    prop::sample::select(GrantObjectType::Table.legal_privileges().to_vec())
}

fn privilege_set() -> impl Strategy<Value = BTreeSet<Privilege>> {
    prop::collection::btree_set(table_privilege(), 0..6)
}

fn role_name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,8}"
}

fn table_grant(objects: Vec<String>, privileges: Vec<Privilege>) -> GrantSpec {
    GrantSpec {
        cluster_ref: ClusterRef {
            name: "main".into(),
            namespace: None,
        },
        database: "app".into(),
        role: "reader".into(),
        schema: Some("public".into()),
        object_type: GrantObjectType::Table,
        objects,
        privileges,
    }
}

// =============================================================================
// Set diff laws
// =============================================================================

proptest! {
    #[test]
    fn set_diff_reaches_desired(current in privilege_set(), desired in privilege_set()) {
        let diff = SetDiff::between(&current, &desired);

        let mut result: BTreeSet<Privilege> =
            current.difference(&diff.to_revoke).copied().collect();
        result.extend(diff.to_grant.iter().copied());

        prop_assert_eq!(&result, &desired);
        prop_assert!(diff.to_revoke.is_disjoint(&diff.to_grant));
        prop_assert_eq!(diff.is_empty(), current == desired);
    }

    #[test]
    fn canonical_members_is_stable(names in prop::collection::vec(role_name(), 0..12)) {
        let canonical = canonical_members(&names);

        // idempotent
        prop_assert_eq!(&canonical_members(&canonical), &canonical);

        // order of the input does not matter
        let mut reversed = names.clone();
        reversed.reverse();
        prop_assert_eq!(&canonical_members(&reversed), &canonical);

        // no duplicates, nothing lost
        let unique: BTreeSet<&String> = names.iter().collect();
        prop_assert_eq!(canonical.len(), unique.len());
        for window in canonical.windows(2) {
            prop_assert!(window[0].to_lowercase() <= window[1].to_lowercase());
        }
    }
}

// =============================================================================
// Grant planning
// =============================================================================

proptest! {
    #[test]
    fn grant_plan_is_idempotent(
        tables in prop::collection::btree_map("[a-z]{1,6}", privilege_set(), 1..6),
        desired in prop::collection::btree_set(table_privilege(), 1..6),
        explicit in any::<bool>(),
    ) {
        let objects: Vec<String> = if explicit {
            tables.keys().cloned().collect()
        } else {
            Vec::new()
        };
        let spec = table_grant(objects, desired.iter().copied().collect());
        let ownership: BTreeMap<String, bool> =
            tables.keys().map(|name| (name.clone(), false)).collect();

        let before = GrantObservation {
            ownership: ownership.clone(),
            current: tables.clone(),
        };
        let plan = plan_grant(&spec, "apps/grant", 17, &before).unwrap();
        prop_assert_eq!(plan.is_converged(), tables.values().all(|held| held == &desired));

        // what the server holds after the plan ran
        let after = GrantObservation {
            ownership,
            current: tables.keys().map(|name| (name.clone(), desired.clone())).collect(),
        };
        let replan = plan_grant(&spec, "apps/grant", 17, &after).unwrap();
        prop_assert!(replan.is_converged());
    }

    #[test]
    fn owned_tables_are_never_touched(
        tables in prop::collection::btree_map("[a-z]{1,6}", any::<bool>(), 1..6),
        desired in prop::collection::btree_set(table_privilege(), 1..6),
    ) {
        let spec = table_grant(Vec::new(), desired.iter().copied().collect());
        let observed = GrantObservation {
            ownership: tables.clone(),
            current: BTreeMap::new(),
        };
        let plan = plan_grant(&spec, "apps/grant", 17, &observed).unwrap();

        let owned: Vec<&String> = tables.iter().filter(|(_, o)| **o).map(|(n, _)| n).collect();
        for statement in &plan.statements {
            for name in &owned {
                let quoted = format!("\"public\".\"{name}\" ");
                prop_assert!(!statement.sql().contains(&quoted));
            }
        }
        prop_assert_eq!(plan.message.is_some(), !owned.is_empty());
        prop_assert_eq!(plan.statements.len(), tables.len() - owned.len());
    }
}

// =============================================================================
// Password verification
// =============================================================================

proptest! {
    #[test]
    fn password_matches_never_panics(verifier in ".*", password in ".*", role in ".*") {
        let _ = password_matches(Some(&verifier), &password, &role);
    }

    #[test]
    fn malformed_scram_never_matches(
        iterations in "[0-9a-z]{0,3}",
        salt in "[A-Za-z0-9+/=]{0,24}",
        keys in "[A-Za-z0-9+/=:]{0,60}",
        password in ".{0,16}",
    ) {
        let verifier = format!("SCRAM-SHA-256${iterations}:{salt}${keys}");
        // a random verifier matching by chance would require a SHA-256 collision
        prop_assert!(!password_matches(Some(&verifier), &password, "role"));
    }

    #[test]
    fn md5_verifier_round_trips(password in "[ -~]{0,24}", role in "[a-z_]{1,12}") {
        let verifier = postgres_protocol::password::md5(password.as_bytes(), &role);
        prop_assert!(password_matches(Some(&verifier), &password, &role));
        let other = format!("{password}x");
        prop_assert!(!password_matches(Some(&verifier), &other, &role));
    }
}
