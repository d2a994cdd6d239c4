//! cache-operator entry point.
//!
//! Brings up logging and the Kubernetes client, serves probes right away,
//! then waits for the leader Lease before running the Cache controller.
//! The admission webhooks run alongside when TLS material is mounted.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kube::Client;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use cache_operator::config::{
    LEASE_NAME, LEASE_RENEW_INTERVAL, LEASE_TTL, OperatorConfig, SHUTDOWN_GRACE_PERIOD,
};
use cache_operator::health::{HEALTH_PORT, HealthState, run_health_server};
use cache_operator::leader_election::LeaderElector;
use cache_operator::run_controller_scoped;
use cache_operator::{WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, run_webhook_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    info!("Starting cache-operator");

    let client = Client::try_default().await?;
    let config = OperatorConfig::from_env();
    info!(
        holder_id = %config.pod_name,
        lease_namespace = %config.pod_namespace,
        scope = %config.scope(),
        "Connected to Kubernetes cluster"
    );

    let health_state = Arc::new(HealthState::new());
    // Raised on shutdown; reconciles observe it and stop mutating
    let stopped = Arc::new(AtomicBool::new(false));

    // Probes answer even while this replica is a follower
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, HEALTH_PORT).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    let elector = LeaderElector::new(
        client.clone(),
        &config.pod_namespace,
        LEASE_NAME,
        &config.pod_name,
        LEASE_TTL,
    );
    acquire_leadership(&elector).await;
    let renewal_handle = spawn_lease_renewal(elector);

    let controller_handle = {
        let health_state = health_state.clone();
        let stopped = stopped.clone();
        let watch_namespace = config.watch_namespace.clone();
        tokio::spawn(async move {
            run_controller_scoped(
                client,
                Some(health_state),
                stopped,
                watch_namespace.as_deref(),
            )
            .await;
        })
    };

    let webhook_handle = spawn_webhook_server();

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!(error = %e, "Health server task panicked");
            }
        }
        result = async {
            match webhook_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!(error = %e, "Webhook server task panicked");
            }
        }
        // Renewal only returns by panicking; lost leadership exits the process
        Err(e) = renewal_handle => {
            error!(error = %e, "Lease renewal task panicked");
        }
        _ = shutdown_signal() => {
            drain(&health_state, &stopped).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// JSON logs filtered by `RUST_LOG`, with info defaults for the operator and kube
fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("cache_operator=info".parse()?)
        .add_directive("kube=info".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
    Ok(())
}

/// Block until this replica holds the Lease
async fn acquire_leadership(elector: &LeaderElector) {
    info!(
        lease_name = LEASE_NAME,
        identity = %elector.identity(),
        "Waiting to acquire leadership"
    );
    loop {
        match elector.try_acquire_or_renew().await {
            Ok(true) => {
                info!("Acquired leadership");
                return;
            }
            Ok(false) => info!("Another replica holds the lease, waiting"),
            Err(e) => warn!(error = %e, "Failed to acquire lease, retrying"),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Keep renewing the Lease; losing it terminates the process so the pod
/// restarts and re-enters the election.
#[allow(clippy::exit)]
fn spawn_lease_renewal(elector: LeaderElector) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
            match elector.try_acquire_or_renew().await {
                Ok(true) => {}
                Ok(false) => {
                    error!("Lost leadership, exiting");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "Failed to renew lease, exiting");
                    std::process::exit(1);
                }
            }
        }
    })
}

/// Start the admission webhooks when both TLS files are mounted
fn spawn_webhook_server() -> Option<JoinHandle<()>> {
    if !(Path::new(WEBHOOK_CERT_PATH).exists() && Path::new(WEBHOOK_KEY_PATH).exists()) {
        info!("Webhook certificates not found, webhook server disabled");
        return None;
    }

    info!("TLS certificates found, starting webhook server");
    Some(tokio::spawn(async move {
        if let Err(e) = run_webhook_server(WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH).await {
            error!(error = %e, "Webhook server failed");
        }
    }))
}

/// Stop advertising readiness, stop new mutations, then let in-flight
/// reconciles finish.
async fn drain(health_state: &HealthState, stopped: &AtomicBool) {
    info!("Received shutdown signal");
    health_state.set_ready(false).await;
    stopped.store(true, Ordering::SeqCst);

    info!(
        grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
        "Waiting for in-flight reconciliations"
    );
    tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
}

/// Wait for SIGTERM or SIGINT.
///
/// Failing to install a handler is fatal: there is no graceful shutdown
/// without it.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
