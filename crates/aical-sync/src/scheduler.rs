//! Periodic job scheduler.
//!
//! The scheduler is built once at startup from a fixed list of [`Job`]s and
//! never changes afterwards. Every job ticks on its own interval. Each tick
//! spawns the handler as a detached task, so a slow run never delays later
//! ticks; handlers that must not overlap are expected to skip on their own.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Future returned by a job handler.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Shared job entry point.
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Errors raised while building a scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("job configured twice: {0}")]
    DuplicateJob(String),

    #[error("job {0} has a zero interval")]
    ZeroInterval(String),
}

/// A job as named in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }
}

/// The set of jobs to run, as read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub jobs: Vec<JobSpec>,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(mut self, name: impl Into<String>, interval: Duration) -> Self {
        self.jobs.push(JobSpec::new(name, interval));
        self
    }
}

/// A named handler with its cadence.
#[derive(Clone)]
pub struct Job {
    name: String,
    interval: Duration,
    handler: JobHandler,
}

impl Job {
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_handler(
            name,
            interval,
            Arc::new(move || Box::pin(handler()) as JobFuture),
        )
    }

    pub fn from_handler(name: impl Into<String>, interval: Duration, handler: JobHandler) -> Self {
        Self {
            name: name.into(),
            interval,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts one run in the background.
    fn trigger(&self, reason: &'static str) {
        debug!(job = %self.name, reason, "triggering job");
        let span = info_span!("job", job = %self.name);
        tokio::spawn((self.handler)().instrument(span));
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Commands that can be sent to a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Trigger the named job now, outside its cadence.
    RunNow(String),
    /// Stop all job loops.
    Stop,
}

/// Runs a fixed set of jobs on their intervals.
pub struct Scheduler {
    jobs: Vec<Job>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    /// Creates a scheduler for `jobs`.
    pub fn new(jobs: Vec<Job>) -> Result<Self, SchedulerError> {
        let mut seen = HashSet::new();
        for job in &jobs {
            if job.interval.is_zero() {
                return Err(SchedulerError::ZeroInterval(job.name.clone()));
            }
            if !seen.insert(job.name.clone()) {
                return Err(SchedulerError::DuplicateJob(job.name.clone()));
            }
        }
        let (command_tx, command_rx) = mpsc::channel(16);
        Ok(Self {
            jobs,
            command_tx,
            command_rx,
        })
    }

    /// Resolves configured job names against the available handlers.
    ///
    /// Every configured job must name a known handler; unknown names are
    /// rejected.
    pub fn from_config(
        config: &SchedulerConfig,
        handlers: &HashMap<String, JobHandler>,
    ) -> Result<Self, SchedulerError> {
        let jobs = config
            .jobs
            .iter()
            .map(|entry| {
                handlers
                    .get(&entry.name)
                    .map(|handler| Job::from_handler(&entry.name, entry.interval, handler.clone()))
                    .ok_or_else(|| SchedulerError::UnknownJob(entry.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(jobs)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Returns a handle for sending commands to the scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs until [`SchedulerCommand::Stop`] is received or every handle is
    /// dropped.
    ///
    /// Each job fires once immediately, then on every interval. Runs already
    /// in flight when the scheduler stops are left to finish on their own.
    pub async fn run(self) {
        let Self {
            jobs,
            command_tx,
            mut command_rx,
        } = self;
        // Only external handles keep the channel open.
        drop(command_tx);

        let stop = CancellationToken::new();
        let mut loops = JoinSet::new();
        for job in jobs.iter().cloned() {
            info!(job = %job.name, interval_secs = job.interval.as_secs(), "job scheduled");
            loops.spawn(job_loop(job, stop.clone()));
        }

        loop {
            match command_rx.recv().await {
                Some(SchedulerCommand::RunNow(name)) => {
                    match jobs.iter().find(|job| job.name == name) {
                        Some(job) => job.trigger("manual"),
                        None => warn!(job = %name, "run requested for unknown job"),
                    }
                }
                Some(SchedulerCommand::Stop) | None => {
                    info!("scheduler stopping");
                    break;
                }
            }
        }

        stop.cancel();
        while loops.join_next().await.is_some() {}
    }
}

async fn job_loop(job: Job, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(job.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => job.trigger("interval"),
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Triggers the named job immediately.
    pub async fn run_now(
        &self,
        name: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx
            .send(SchedulerCommand::RunNow(name.into()))
            .await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }
}
