//! Schema reconciler

use tracing::info;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::reconciler::{ManagedResource, commit_plan};
use crate::controller::status::Outcome;
use crate::crd::{ClusterRef, ManagedStatus, ReclaimPolicy, Schema};
use crate::diff::owned_object::{self, OwnedObjectKind};
use crate::resources::catalog;
use crate::resources::{PostgresSession, apply_statements};

impl ManagedResource for Schema {
    const KIND: &'static str = "Schema";

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
        Some(&self.spec.database)
    }

    fn drops_on_delete(&self) -> bool {
        self.spec.reclaim_policy == ReclaimPolicy::Delete
    }

    async fn converge(&self, session: &mut PostgresSession, _ctx: &Context) -> Result<Outcome> {
        let tx = session.transaction().await?;
        let current_owner = catalog::schema_owner(&tx, &self.spec.name).await?;
        let plan = owned_object::plan(
            OwnedObjectKind::Schema,
            &self.spec.name,
            self.spec.owner.as_deref(),
            current_owner.as_deref(),
        );
        commit_plan(tx, plan).await
    }

    async fn cleanup(&self, session: &mut PostgresSession) -> Result<()> {
        let statement = OwnedObjectKind::Schema.drop(&self.spec.name);
        apply_statements(session.client(), &[statement]).await?;
        info!(
            database = %self.spec.database,
            schema = %self.spec.name,
            "Dropped schema"
        );
        Ok(())
    }
}
