//! Grant reconciler

use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::reconciler::{ManagedResource, commit_plan};
use crate::controller::status::Outcome;
use crate::crd::{ClusterRef, Grant, GrantObjectType, ManagedStatus};
use crate::diff::Rejection;
use crate::diff::privileges::{self, GrantObservation};
use crate::resources::catalog;
use crate::resources::{PostgresSession, apply_statements};

impl ManagedResource for Grant {
    const KIND: &'static str = "Grant";

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
        privileges::validate_grant(&self.spec, resource)
    }

    async fn converge(&self, session: &mut PostgresSession, _ctx: &Context) -> Result<Outcome> {
        let spec = &self.spec;
        let resource = self.qualified_name();
        let server_version = session.server_version();
        let strategy = spec.object_type.catalog_strategy();
        let named: &[String] = match spec.object_type {
            GrantObjectType::Table | GrantObjectType::Sequence => &spec.objects,
            GrantObjectType::Database | GrantObjectType::Schema => &[],
        };

        let tx = session.transaction().await?;
        let observed = GrantObservation {
            ownership: catalog::object_ownership(
                &tx,
                strategy,
                &spec.database,
                spec.schema_name(),
                named,
                &spec.role,
            )
            .await?,
            current: catalog::object_privileges(
                &tx,
                strategy,
                &spec.database,
                spec.schema_name(),
                &spec.role,
            )
            .await?,
        };
        debug!(
            objects = observed.ownership.len(),
            with_privileges = observed.current.len(),
            "Observed grant scope"
        );

        let plan = privileges::plan_grant(spec, &resource, server_version, &observed)?;
        commit_plan(tx, plan).await
    }

    async fn cleanup(&self, session: &mut PostgresSession) -> Result<()> {
        let spec = &self.spec;
        let tx = session.transaction().await?;

        // nothing can be held by a role or in a schema that is already gone
        if catalog::role_state(&tx, &spec.role).await?.is_none() {
            return Ok(());
        }
        if spec.object_type != GrantObjectType::Database
            && catalog::schema_owner(&tx, spec.schema_name()).await?.is_none()
        {
            return Ok(());
        }

        let current = catalog::object_privileges(
            &tx,
            spec.object_type.catalog_strategy(),
            &spec.database,
            spec.schema_name(),
            &spec.role,
        )
        .await?;
        let statements = privileges::revoke_all_grants(spec, &current);
        apply_statements(&tx, &statements).await?;
        tx.commit().await?;

        info!(role = %spec.role, revoked = statements.len(), "Revoked grant");
        Ok(())
    }
}
