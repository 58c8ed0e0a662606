//! `aical run`: the long-running daemon.
//!
//! Startup order: store, gateway, orchestrator, scheduler, signal listener.
//! A termination signal cancels the orchestrator's shutdown token, stops the
//! scheduler and waits briefly for an in-flight cycle to wind down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aical_gateway::CalendarGateway;
use aical_store::Store;
use aical_sync::{
    CycleOutcome, JobFuture, JobHandler, Scheduler, SchedulerConfig, SyncOrchestrator,
};
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::signals::ShutdownListener;

/// Name of the job that runs a sync cycle.
pub const SYNC_JOB: &str = "sync";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(config: &DaemonConfig) -> DaemonResult<()> {
    let store = super::open_store(config)?;
    let gateway = super::build_gateway(config)?;
    let orchestrator = orchestrator(store, gateway, config)?;
    let listener = ShutdownListener::new(orchestrator.shutdown_token());
    listener.spawn()?;

    serve(orchestrator, &config.scheduler_config(), &listener).await
}

/// Handlers that configured jobs may name.
pub fn job_handlers(orchestrator: &Arc<SyncOrchestrator>) -> HashMap<String, JobHandler> {
    let orchestrator = orchestrator.clone();
    let sync: JobHandler = Arc::new(move || {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            match orchestrator.run_sync_cycle().await {
                CycleOutcome::Completed(report) => debug!(
                    users = report.users,
                    duration_ms = report.duration().num_milliseconds(),
                    "scheduled cycle completed"
                ),
                CycleOutcome::Skipped => debug!("scheduled cycle dropped, previous still running"),
                // Logged by the orchestrator.
                CycleOutcome::Aborted(_) => {}
            }
        }) as JobFuture
    });

    HashMap::from([(SYNC_JOB.to_string(), sync)])
}

/// Runs the scheduler until `listener` reports shutdown.
pub async fn serve(
    orchestrator: Arc<SyncOrchestrator>,
    scheduler_config: &SchedulerConfig,
    listener: &ShutdownListener,
) -> DaemonResult<()> {
    let scheduler = Scheduler::from_config(scheduler_config, &job_handlers(&orchestrator))?;
    for job in scheduler.jobs() {
        info!(job = job.name(), interval_secs = job.interval().as_secs(), "job registered");
    }
    let handle = scheduler.handle();
    let scheduler_task = tokio::spawn(scheduler.run());

    listener.wait().await;
    info!("shutting down");
    orchestrator.shutdown_token().cancel();
    if let Err(e) = handle.stop().await {
        warn!(error = %e, "failed to send stop command to scheduler");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_task).await.is_err() {
        warn!("scheduler did not stop in time");
    }

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while orchestrator.is_running() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("sync cycle still running at exit");
    }

    info!("daemon stopped");
    Ok(())
}

/// Wires an orchestrator from already-built parts.
pub fn orchestrator(
    store: Arc<dyn Store>,
    gateway: Arc<dyn CalendarGateway>,
    config: &DaemonConfig,
) -> DaemonResult<Arc<SyncOrchestrator>> {
    Ok(Arc::new(SyncOrchestrator::new(store, gateway, config.sync_config()?)))
}
