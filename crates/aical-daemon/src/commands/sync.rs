//! `aical sync-once`: one foreground cycle.

use std::io::Write;

use aical_sync::{CycleOutcome, CycleReport, SyncOrchestrator};

use super::write_line;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

pub async fn run(config: &DaemonConfig) -> DaemonResult<()> {
    let store = super::open_store(config)?;
    let gateway = super::build_gateway(config)?;
    let orchestrator = super::run::orchestrator(store, gateway, config)?;
    sync_once(&orchestrator, &mut std::io::stdout()).await
}

/// Runs a cycle and prints its totals. An aborted cycle is an error.
pub async fn sync_once<W: Write>(orchestrator: &SyncOrchestrator, out: &mut W) -> DaemonResult<()> {
    match orchestrator.run_sync_cycle().await {
        CycleOutcome::Completed(report) => {
            for line in summary(&report) {
                write_line(out, line)?;
            }
            Ok(())
        }
        CycleOutcome::Skipped => write_line(out, "another sync cycle is already running"),
        CycleOutcome::Aborted(err) => Err(DaemonError::Sync(err)),
    }
}

fn summary(report: &CycleReport) -> Vec<String> {
    let c = &report.calendars;
    let e = &report.events;
    vec![
        format!(
            "synced {} user(s) in {} ms",
            report.users,
            report.duration().num_milliseconds()
        ),
        format!(
            "calendars: {} created, {} updated, {} deleted, {} unchanged",
            c.created, c.updated, c.deleted, c.unchanged
        ),
        format!(
            "events: {} created, {} updated, {} deleted, {} skipped",
            e.created, e.updated, e.deleted, e.skipped
        ),
    ]
}
