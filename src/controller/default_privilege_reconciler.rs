//! DefaultPrivilege reconciler

use tracing::info;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::reconciler::{ManagedResource, commit_plan};
use crate::controller::status::Outcome;
use crate::crd::{ClusterRef, DefaultPrivilege, ManagedStatus};
use crate::diff::Rejection;
use crate::diff::privileges;
use crate::resources::catalog;
use crate::resources::{PostgresSession, apply_statements};

impl ManagedResource for DefaultPrivilege {
    const KIND: &'static str = "DefaultPrivilege";

    fn status(&self) -> Option<&ManagedStatus> {
        self.status.as_ref()
    }

    fn cluster_ref(&self) -> &ClusterRef {
        &self.spec.cluster_ref
    }

    fn display_name(&self) -> String {
        self.spec.describe()
    }

    fn target_database(&self) -> Option<&str> {
        Some(&self.spec.database)
    }

    fn drops_on_delete(&self) -> bool {
        true
    }

    fn preflight(&self, resource: &str) -> Result<(), Rejection> {
        privileges::validate_default_privilege(&self.spec, resource)
    }

    async fn converge(&self, session: &mut PostgresSession, _ctx: &Context) -> Result<Outcome> {
        let spec = &self.spec;
        let resource = self.qualified_name();
        let server_version = session.server_version();

        let tx = session.transaction().await?;
        let current = catalog::default_privileges(
            &tx,
            &spec.owner,
            spec.scoped_schema(),
            spec.object_type,
            &spec.role,
        )
        .await?;
        let plan = privileges::plan_default_privileges(spec, &resource, server_version, &current)?;
        commit_plan(tx, plan).await
    }

    async fn cleanup(&self, session: &mut PostgresSession) -> Result<()> {
        let spec = &self.spec;
        let tx = session.transaction().await?;

        if catalog::role_state(&tx, &spec.role).await?.is_none()
            || catalog::role_state(&tx, &spec.owner).await?.is_none()
        {
            return Ok(());
        }
        if let Some(schema) = spec.scoped_schema() {
            if catalog::schema_owner(&tx, schema).await?.is_none() {
                return Ok(());
            }
        }

        let current = catalog::default_privileges(
            &tx,
            &spec.owner,
            spec.scoped_schema(),
            spec.object_type,
            &spec.role,
        )
        .await?;
        let statements = privileges::revoke_all_default_privileges(spec, &current);
        apply_statements(&tx, &statements).await?;
        tx.commit().await?;

        info!(
            owner = %spec.owner,
            role = %spec.role,
            "Revoked default privileges"
        );
        Ok(())
    }
}
