//! LedgerFlow Worker
//!
//! Runs pending payment reconciliation passes on a schedule.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile every 60 seconds until Ctrl+C
//! ledgerflow-worker
//!
//! # One pass against seeded in-memory backends
//! ledgerflow-worker --demo --once
//!
//! # Environment overrides
//! LEDGERFLOW__RECONCILER__WORKERS=10 ledgerflow-worker
//! ```

mod config;
mod demo;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledgerflow_lock::InMemoryLockService;
use ledgerflow_payments::{InMemoryPaymentFlowState, PaymentFlowStateRepository};
use ledgerflow_reconciler::{LedgerFeeReimburser, PendingPaymentReconciler, ReconcilerServices};

use crate::config::WorkerConfig;
use crate::demo::DemoBackends;

// =============================================================================
// CLI Arguments
// =============================================================================

/// LedgerFlow Worker - finalizes pending network payments
#[derive(Parser, Debug)]
#[command(name = "ledgerflow-worker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "LEDGERFLOW_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LEDGERFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "LEDGERFLOW_LOG_FORMAT")]
    log_format: Option<String>,

    /// Wallets reconciled in parallel
    #[arg(short, long, env = "LEDGERFLOW_WORKERS")]
    workers: Option<usize>,

    /// Seconds between passes
    #[arg(short, long, env = "LEDGERFLOW_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Seed in-memory backends with sample payments
    #[arg(long, env = "LEDGERFLOW_DEMO")]
    demo: bool,
}

impl Args {
    fn apply(self, config: &mut WorkerConfig) {
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(workers) = self.workers {
            config.reconciler.workers = workers;
        }
        if let Some(interval_secs) = self.interval_secs {
            config.schedule.interval_secs = interval_secs;
        }
        config.schedule.run_once |= self.once;
        config.demo.enabled |= self.demo;
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut worker_config = WorkerConfig::load(args.config.as_deref())?;
    args.apply(&mut worker_config);

    init_logging(&worker_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = worker_config.reconciler.workers,
        interval_secs = worker_config.schedule.interval_secs,
        demo = worker_config.demo.enabled,
        "Starting LedgerFlow worker"
    );

    let flow_state = Arc::new(InMemoryPaymentFlowState::new(worker_config.reconciler.flow_state_ttl()));
    let backends = DemoBackends::new(flow_state.clone());
    if worker_config.demo.enabled {
        demo::seed(&backends, worker_config.fees.clone()).await?;
    } else {
        tracing::warn!("No ledger backend configured; running against empty in-memory backends");
    }

    let lock = Arc::new(InMemoryLockService::new(worker_config.reconciler.lock_timeout()));
    let ledger = Arc::new(backends.ledger.clone());
    let services = ReconcilerServices {
        ledger: ledger.clone(),
        lock: lock.clone(),
        network: Arc::new(backends.network.clone()),
        wallets: Arc::new(backends.wallets.clone()),
        flow_state: flow_state.clone(),
        reimburser: Arc::new(LedgerFeeReimburser::new(ledger)),
    };
    let reconciler = PendingPaymentReconciler::new(services, worker_config.reconciler.clone());

    if worker_config.schedule.run_once {
        run_pass(&reconciler, flow_state.as_ref(), &lock).await;
        tracing::info!("Single pass complete");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(worker_config.schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_pass(&reconciler, flow_state.as_ref(), &lock).await,
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}

/// One reconciliation pass plus housekeeping of the in-process caches
async fn run_pass(
    reconciler: &PendingPaymentReconciler,
    flow_state: &dyn PaymentFlowStateRepository,
    lock: &InMemoryLockService,
) {
    let report = reconciler.reconcile_all_pending_payments().await;
    if let Ok(summary) = serde_json::to_string(&report) {
        tracing::debug!(report = %summary, "Pass report");
    }

    match flow_state.delete_expired().await {
        Ok(removed) if removed > 0 => tracing::debug!(removed, "Expired payment flows removed"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not delete expired payment flows"),
    }
    let pruned = lock.prune();
    tracing::trace!(pruned, "Pruned idle lock keys");
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()?,
        _ => subscriber
            .with(fmt::layer().pretty().with_target(true))
            .try_init()?,
    }

    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping after the current pass");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping after the current pass");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
