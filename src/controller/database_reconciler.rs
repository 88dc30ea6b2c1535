//! Database reconciler
//!
//! `CREATE DATABASE` cannot run inside a transaction block, so the at most two
//! statements of a database plan run one after the other on the session.

use tracing::info;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::reconciler::ManagedResource;
use crate::controller::status::Outcome;
use crate::crd::{ClusterRef, Database, ManagedStatus, ReclaimPolicy};
use crate::diff::owned_object::{self, OwnedObjectKind};
use crate::resources::catalog;
use crate::resources::{PostgresSession, apply_statements};

impl ManagedResource for Database {
    const KIND: &'static str = "Database";

    fn status(&self) -> Option<&ManagedStatus> {
        self.status.as_ref()
    }

    fn cluster_ref(&self) -> &ClusterRef {
        &self.spec.cluster_ref
    }

    fn display_name(&self) -> String {
        self.spec.name.clone()
    }

    fn target_database(&self) -> Option<&str> {
        None
    }

    fn drops_on_delete(&self) -> bool {
        self.spec.reclaim_policy == ReclaimPolicy::Delete
    }

    async fn converge(&self, session: &mut PostgresSession, _ctx: &Context) -> Result<Outcome> {
        let current_owner = catalog::database_owner(session.client(), &self.spec.name).await?;
        let plan = owned_object::plan(
            OwnedObjectKind::Database,
            &self.spec.name,
            self.spec.owner.as_deref(),
            current_owner.as_deref(),
        );

        if plan.is_converged() {
            return Ok(Outcome::Converged(plan.message));
        }

        apply_statements(session.client(), &plan.statements).await?;
        info!(database = %self.spec.name, "Database converged");
        Ok(Outcome::Applied(plan.message))
    }

    async fn cleanup(&self, session: &mut PostgresSession) -> Result<()> {
        let statement = OwnedObjectKind::Database.drop(&self.spec.name);
        apply_statements(session.client(), &[statement]).await?;
        info!(database = %self.spec.name, "Dropped database");
        Ok(())
    }
}
