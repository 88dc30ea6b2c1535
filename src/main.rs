use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use pg_object_operator::health::{HealthState, run_health_server};
use pg_object_operator::{OperatorConfig, run_controllers};

/// Lease configuration
const LEASE_NAME: &str = "pg-object-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pg_object_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();

    info!("Starting pg-object-operator");

    let config = OperatorConfig::from_env()?;

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (probes should work even as non-leader)
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_addr;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let is_leader = Arc::new(AtomicBool::new(false));
    let lease_renewal_handle = if config.leader_election {
        let holder_id = config.pod_name.clone().unwrap_or_else(|| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        });
        info!(
            holder_id = %holder_id,
            namespace = %config.pod_namespace,
            lease_name = LEASE_NAME,
            "Initializing leader election"
        );

        let lease_params = LeaseLockParams {
            holder_id,
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        };
        let lease_lock = LeaseLock::new(
            client.clone(),
            &config.pod_namespace,
            LeaseLockParams {
                holder_id: lease_params.holder_id.clone(),
                lease_name: lease_params.lease_name.clone(),
                lease_ttl: lease_params.lease_ttl,
            },
        );

        info!("Waiting to acquire leadership...");
        loop {
            match lease_lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {
                    info!("Acquired leadership");
                    is_leader.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => info!("Another instance is leader, waiting..."),
                Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
            }
            tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
        }

        let is_leader = is_leader.clone();
        let lease_lock = LeaseLock::new(client.clone(), &config.pod_namespace, lease_params);
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) if result.acquired_lease => {}
                    Ok(_) => {
                        error!("Lost leadership! Shutting down...");
                        is_leader.store(false, Ordering::SeqCst);
                        // Exit so Kubernetes restarts us and we re-enter election
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        is_leader.store(false, Ordering::SeqCst);
                        std::process::exit(1);
                    }
                }
            }
        }))
    } else {
        info!("Leader election disabled");
        None
    };

    info!(
        scope = config.watch_namespace.as_deref().unwrap_or("cluster-wide"),
        "Watching resources (apiVersion: postgresql.aboutbits.it/v1)"
    );

    let controller_handle = {
        let health_state = health_state.clone();
        let namespace = config.watch_namespace.clone();
        tokio::spawn(async move {
            run_controllers(client, Some(health_state), namespace.as_deref()).await;
        })
    };

    let lease_future = async {
        match lease_renewal_handle {
            // Lease renewal only exits via process::exit() or panic
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Lease renewal task panicked: {}", e);
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = lease_future => {}
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
