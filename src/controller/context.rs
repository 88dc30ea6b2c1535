use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kube::Client;

use crate::health::HealthState;

/// Shared context for every controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Metrics sink, absent in tests
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            health_state,
        }
    }

    /// Record a finished reconciliation in the metrics registry
    pub fn record_reconcile(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        elapsed: Duration,
        failed: bool,
    ) {
        let Some(state) = &self.health_state else {
            return;
        };
        state
            .metrics
            .record_reconcile(kind, namespace, name, elapsed.as_secs_f64());
        if failed {
            state.metrics.record_error(kind, namespace, name);
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs())
            .unwrap_or_default();
        state.touch(now);
    }
}
