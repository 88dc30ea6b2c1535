//! Diff planners
//!
//! Pure functions turning a declared spec plus an observed catalog snapshot
//! into the statements that converge the server. Nothing in here talks to the
//! server or to Kubernetes.

pub mod owned_object;
pub mod privileges;
pub mod role;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::resources::sql::Statement;

/// Statements to run and the message to report once they succeed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub statements: Vec<Statement>,
    pub message: Option<String>,
}

impl Plan {
    pub fn new(statements: Vec<Statement>, message: Option<String>) -> Self {
        Self {
            statements,
            message,
        }
    }

    /// Nothing to execute
    pub fn is_converged(&self) -> bool {
        self.statements.is_empty()
    }
}

/// The declared state cannot be applied; no statement may run
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{0}")]
pub struct Rejection(pub String);

/// Revoke and grant sets moving `current` to `desired`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetDiff<T: Ord> {
    pub to_revoke: BTreeSet<T>,
    pub to_grant: BTreeSet<T>,
}

impl<T: Ord + Clone> SetDiff<T> {
    pub fn between(current: &BTreeSet<T>, desired: &BTreeSet<T>) -> Self {
        Self {
            to_revoke: current.difference(desired).cloned().collect(),
            to_grant: desired.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_revoke.is_empty() && self.to_grant.is_empty()
    }
}

/// `namespace/name` as used in status messages
pub fn resource_ref(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
