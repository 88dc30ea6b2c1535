//! Role reconciler
//!
//! The password of a login role is read from its Secret on every pass and
//! checked against the stored verifier; the Role controller also watches
//! Secrets so a rotated password converges without waiting for the resync.

use kube::ResourceExt;
use tracing::info;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::reconciler::{ManagedResource, commit_plan};
use crate::controller::status::Outcome;
use crate::crd::{ClusterRef, ManagedStatus, Role};
use crate::diff::role;
use crate::resources::catalog;
use crate::resources::secret::fetch_basic_auth;
use crate::resources::sql;
use crate::resources::{PostgresSession, apply_statements};

impl ManagedResource for Role {
    const KIND: &'static str = "Role";

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
        true
    }

    async fn converge(&self, session: &mut PostgresSession, ctx: &Context) -> Result<Outcome> {
        let credentials = match &self.spec.password_secret_ref {
            Some(secret_ref) => {
                let namespace = self.namespace().unwrap_or_default();
                Some(fetch_basic_auth(&ctx.client, secret_ref, &namespace).await?)
            }
            None => None,
        };
        let password = credentials.as_ref().map(|c| c.password.as_str());

        let tx = session.transaction().await?;
        let current = catalog::role_state(&tx, &self.spec.name).await?;
        let plan = role::plan(&self.spec, password, current.as_ref())?;
        commit_plan(tx, plan).await
    }

    async fn cleanup(&self, session: &mut PostgresSession) -> Result<()> {
        apply_statements(session.client(), &[sql::drop_role(&self.spec.name)]).await?;
        info!(role = %self.spec.name, "Dropped role");
        Ok(())
    }
}
