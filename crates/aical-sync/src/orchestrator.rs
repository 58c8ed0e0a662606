//! Sync cycle orchestration.
//!
//! One cycle walks every user: exchange the refresh credential, reconcile the
//! calendar list, then reconcile each calendar's events inside the rolling
//! window. At most one cycle runs at a time; a trigger that arrives while a
//! cycle is in progress returns immediately without touching the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aical_core::{TimeWindow, User};
use aical_gateway::CalendarGateway;
use aical_store::Store;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::calendar_sync::{CalendarReconciler, CalendarSyncReport};
use crate::deadline::Deadline;
use crate::error::{SyncError, SyncResult};
use crate::event_sync::{EventReconciler, EventSyncReport};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Hard limit on the duration of one cycle.
    pub deadline: Duration,
    /// Offset used to find the start of the local week.
    pub utc_offset: FixedOffset,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(Self::DEFAULT_DEADLINE_SECS),
            utc_offset: Utc.fix(),
        }
    }
}

impl SyncConfig {
    pub const DEFAULT_DEADLINE_SECS: u64 = 600;

    /// Builder: set the cycle deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Builder: set the offset used for week boundaries.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Returns the event window for a cycle starting at `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::rolling_fortnight(now, &self.utc_offset)
    }
}

/// Totals of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub users: usize,
    pub calendars: CalendarSyncReport,
    pub events: EventSyncReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            users: 0,
            calendars: CalendarSyncReport::default(),
            events: EventSyncReport::default(),
            started_at,
            finished_at: started_at,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Result of one trigger.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every user was reconciled.
    Completed(CycleReport),
    /// Another cycle held the exclusion flag; nothing was done.
    Skipped,
    /// The cycle stopped at the first hard error, deadline or cancellation.
    Aborted(SyncError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Aborted(err) => Some(err),
            _ => None,
        }
    }
}

/// Exclusion flag holder, released on drop.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives sync cycles over all users.
pub struct SyncOrchestrator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn CalendarGateway>,
    calendars: CalendarReconciler,
    events: EventReconciler,
    config: SyncConfig,
    running: AtomicBool,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    shutdown: CancellationToken,
    clock: fn() -> DateTime<Utc>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn CalendarGateway>,
        config: SyncConfig,
    ) -> Self {
        Self {
            calendars: CalendarReconciler::new(store.clone()),
            events: EventReconciler::new(store.clone()),
            store,
            gateway,
            config,
            running: AtomicBool::new(false),
            last_sync: RwLock::new(None),
            shutdown: CancellationToken::new(),
            clock: Utc::now,
        }
    }

    /// Builder: replace the wall clock that places the event window.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns true while a cycle holds the exclusion flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Completion time of the last fully successful cycle.
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read().await
    }

    /// Token whose cancellation stops the running cycle and every later one.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs one sync cycle, or does nothing if one is already running.
    ///
    /// Errors are logged and reported through the outcome, never returned.
    pub async fn run_sync_cycle(&self) -> CycleOutcome {
        let Some(_guard) = RunGuard::try_acquire(&self.running) else {
            info!("sync cycle already running, skipping trigger");
            return CycleOutcome::Skipped;
        };

        let started_at = (self.clock)();
        let deadline =
            Deadline::after(self.config.deadline).with_token(self.shutdown.child_token());
        let span = info_span!("sync_cycle", started_at = %started_at);

        match self.run_cycle(started_at, &deadline).instrument(span).await {
            Ok(report) => {
                *self.last_sync.write().await = Some(report.finished_at);
                info!(
                    users = report.users,
                    calendars_created = report.calendars.created,
                    calendars_updated = report.calendars.updated,
                    calendars_deleted = report.calendars.deleted,
                    events_created = report.events.created,
                    events_updated = report.events.updated,
                    events_deleted = report.events.deleted,
                    events_skipped = report.events.skipped,
                    duration_ms = report.duration().num_milliseconds(),
                    "sync cycle completed"
                );
                CycleOutcome::Completed(report)
            }
            Err(err) => {
                match &err {
                    SyncError::DeadlineExceeded | SyncError::Cancelled => {
                        warn!(kind = err.kind(), error = %err, "sync cycle stopped")
                    }
                    _ => error!(kind = err.kind(), error = %err, "sync cycle aborted"),
                }
                CycleOutcome::Aborted(err)
            }
        }
    }

    async fn run_cycle(
        &self,
        started_at: DateTime<Utc>,
        deadline: &Deadline,
    ) -> SyncResult<CycleReport> {
        let mut report = CycleReport::new(started_at);
        let window = self.config.window_at(started_at);

        deadline.check()?;
        let users = self.store.list_users().await?;
        debug!(
            users = users.len(),
            window_start = %window.start,
            window_end = %window.end,
            "starting sync cycle"
        );

        for user in users {
            deadline.check()?;
            let span = info_span!("user", user_id = %user.id);
            self.sync_user(&user, window, deadline, &mut report)
                .instrument(span)
                .await?;
            report.users += 1;
        }

        report.finished_at = (self.clock)();
        Ok(report)
    }

    async fn sync_user(
        &self,
        user: &User,
        window: TimeWindow,
        deadline: &Deadline,
        report: &mut CycleReport,
    ) -> SyncResult<()> {
        let access = deadline
            .race(self.gateway.exchange_credential(&user.refresh_credential))
            .await?
            .map_err(|e| SyncError::credential(user.id, e))?;

        let remote_calendars = deadline.race(self.gateway.list_calendars(&access)).await??;
        report.calendars += self
            .calendars
            .reconcile(user.id, remote_calendars, deadline)
            .await?;

        deadline.check()?;
        let calendars = self.store.list_calendars(user.id).await?;
        for calendar in calendars {
            deadline.check()?;
            let span = info_span!("calendar", calendar_id = %calendar.id);
            async {
                let remote = deadline
                    .race(
                        self.gateway
                            .list_events(&access, &calendar.external_id, window),
                    )
                    .await??;
                report.events += self
                    .events
                    .reconcile(calendar.id, remote, deadline)
                    .await?;
                Ok::<_, SyncError>(())
            }
            .instrument(span)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aical_core::{ChangeType, RemoteCalendar, RemoteEvent};
    use aical_gateway::{GatewayError, StaticGateway, StaticOperation};
    use aical_store::{CalendarRepo, EventHistoryRepo, EventRepo, MemoryStore, UserRepo};
    use chrono::{Duration as ChronoDuration, TimeZone};

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<StaticGateway>,
        orchestrator: Arc<SyncOrchestrator>,
    }

    impl Fixture {
        async fn new(gateway: StaticGateway, config: SyncConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let gateway = Arc::new(gateway);
            let orchestrator = Arc::new(
                SyncOrchestrator::new(store.clone(), gateway.clone(), config).with_clock(now),
            );
            Self {
                store,
                gateway,
                orchestrator,
            }
        }

        async fn add_user(&self, refresh: &str) -> User {
            self.store
                .create_user(User::new(
                    format!("acct-{}", refresh),
                    "Ada",
                    "ada@example.com",
                    refresh,
                ))
                .await
                .unwrap()
        }
    }

    // Wednesday noon.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    fn this_week(hours: i64) -> DateTime<Utc> {
        let window = SyncConfig::default().window_at(now());
        window.start + ChronoDuration::hours(hours)
    }

    fn remote(external_id: &str, title: &str, updated: DateTime<Utc>) -> RemoteEvent {
        RemoteEvent::new(
            external_id,
            title,
            this_week(33),
            this_week(34),
            updated,
        )
    }

    #[tokio::test]
    async fn full_cycle_mirrors_remote_state() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        let user = fx.add_user("r1").await;
        let updated = now() - ChronoDuration::days(1);
        fx.gateway
            .set_calendars(
                "r1",
                vec![
                    RemoteCalendar::new("work", "Work"),
                    RemoteCalendar::new("home", "Home"),
                ],
            )
            .await;
        fx.gateway
            .set_events(
                "r1",
                "work",
                vec![remote("e1", "Standup", updated), remote("e2", "Retro", updated)],
            )
            .await;

        let outcome = fx.orchestrator.run_sync_cycle().await;

        let report = outcome.report().expect("cycle should complete");
        assert_eq!(report.users, 1);
        assert_eq!(report.calendars.created, 2);
        assert_eq!(report.events.created, 2);
        assert!(fx.orchestrator.last_sync().await.is_some());
        assert!(!fx.orchestrator.is_running());

        let calendars = fx.store.list_calendars(user.id).await.unwrap();
        let work = calendars.iter().find(|c| c.external_id == "work").unwrap();
        assert_eq!(fx.store.list_events(work.id).await.unwrap().len(), 2);

        let second = fx.orchestrator.run_sync_cycle().await;
        let report = second.report().unwrap();
        assert_eq!(report.events.changes(), 0);
        assert_eq!(report.events.skipped, 2);
        assert!(report.calendars.is_noop());
    }

    #[tokio::test]
    async fn events_outside_window_are_not_mirrored() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        let user = fx.add_user("r1").await;
        let updated = now() - ChronoDuration::days(1);
        let far = this_week(24 * 30);
        fx.gateway
            .set_calendars("r1", vec![RemoteCalendar::new("work", "Work")])
            .await;
        fx.gateway
            .set_events(
                "r1",
                "work",
                vec![
                    remote("near", "Standup", updated),
                    RemoteEvent::new(
                        "far",
                        "Offsite",
                        far,
                        far + ChronoDuration::hours(1),
                        updated,
                    ),
                ],
            )
            .await;

        fx.orchestrator.run_sync_cycle().await;

        let calendar = fx.store.list_calendars(user.id).await.unwrap().remove(0);
        let events = fx.store.list_events(calendar.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_id.as_deref(), Some("near"));
    }

    #[tokio::test]
    async fn credential_failure_aborts_whole_cycle() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        let bad = fx.add_user("unknown-to-gateway").await;
        let good = fx.add_user("r2").await;
        fx.gateway
            .set_calendars("r2", vec![RemoteCalendar::new("work", "Work")])
            .await;

        let outcome = fx.orchestrator.run_sync_cycle().await;

        match outcome.error() {
            Some(SyncError::Credential { user_id, source }) => {
                assert_eq!(*user_id, bad.id);
                assert!(source.is_credential());
            }
            other => panic!("expected credential error, got {:?}", other),
        }
        // The second user was never reached.
        assert!(fx.store.list_calendars(good.id).await.unwrap().is_empty());
        assert!(fx.orchestrator.last_sync().await.is_none());
        assert!(!fx.orchestrator.is_running());
    }

    #[tokio::test]
    async fn gateway_failure_aborts_cycle() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        fx.add_user("r1").await;
        fx.gateway
            .set_calendars("r1", vec![RemoteCalendar::new("work", "Work")])
            .await;
        fx.gateway
            .fail(StaticOperation::ListEvents, GatewayError::server("503"))
            .await;

        let outcome = fx.orchestrator.run_sync_cycle().await;

        assert!(matches!(outcome.error(), Some(SyncError::Gateway(e)) if e.is_retryable()));

        fx.gateway.clear_failures().await;
        assert!(fx.orchestrator.run_sync_cycle().await.is_completed());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_committed_rows() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        let user = fx.add_user("r1").await;
        let updated = now() - ChronoDuration::days(1);
        fx.gateway
            .set_calendars("r1", vec![RemoteCalendar::new("work", "Work")])
            .await;
        fx.gateway
            .set_events(
                "r1",
                "work",
                vec![remote("e1", "A", updated), remote("e2", "B", updated)],
            )
            .await;
        fx.store.fail_event_writes_after(1);

        let outcome = fx.orchestrator.run_sync_cycle().await;

        assert!(matches!(outcome.error(), Some(SyncError::Persistence(_))));
        let calendar = fx.store.list_calendars(user.id).await.unwrap().remove(0);
        assert_eq!(fx.store.list_events(calendar.id).await.unwrap().len(), 1);
        assert_eq!(
            fx.store
                .list_calendar_event_history(calendar.id)
                .await
                .unwrap()
                .len(),
            1
        );

        fx.store.clear_injected_failures();
        let report = fx.orchestrator.run_sync_cycle().await;
        assert_eq!(report.report().unwrap().events.created, 1);
    }

    #[tokio::test]
    async fn calendar_write_failure_aborts_cycle() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        let first = fx.add_user("r1").await;
        let second = fx.add_user("r2").await;
        let updated = now() - ChronoDuration::days(1);
        fx.gateway
            .set_calendars(
                "r1",
                vec![
                    RemoteCalendar::new("work", "Work"),
                    RemoteCalendar::new("home", "Home"),
                ],
            )
            .await;
        fx.gateway
            .set_events("r1", "work", vec![remote("e1", "Standup", updated)])
            .await;
        fx.gateway
            .set_calendars("r2", vec![RemoteCalendar::new("work", "Work")])
            .await;
        fx.store.fail_calendar_writes_after(1);

        let outcome = fx.orchestrator.run_sync_cycle().await;

        assert!(matches!(outcome.error(), Some(SyncError::Persistence(_))));
        let calendars = fx.store.list_calendars(first.id).await.unwrap();
        assert_eq!(calendars.len(), 1);
        // Event reconciliation never started.
        assert!(fx.store.list_events(calendars[0].id).await.unwrap().is_empty());
        assert_eq!(fx.store.history_len().await, 0);
        assert!(fx.store.list_calendars(second.id).await.unwrap().is_empty());
        assert!(fx.orchestrator.last_sync().await.is_none());
        assert!(!fx.orchestrator.is_running());
    }

    #[tokio::test]
    async fn window_follows_the_clock() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        fx.add_user("r1").await;
        fx.gateway.set_calendars("r1", vec![]).await;

        let outcome = fx.orchestrator.run_sync_cycle().await;

        let report = outcome.report().unwrap();
        assert_eq!(report.started_at, now());
        assert_eq!(fx.orchestrator.last_sync().await, Some(now()));
        assert_eq!(
            SyncConfig::default().window_at(now()).start,
            Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_trigger_is_skipped_without_store_access() {
        let gateway = StaticGateway::new().with_latency(std::time::Duration::from_secs(30));
        let fx = Fixture::new(gateway, SyncConfig::default()).await;
        fx.add_user("r1").await;
        fx.gateway
            .set_calendars("r1", vec![RemoteCalendar::new("work", "Work")])
            .await;

        let orchestrator = fx.orchestrator.clone();
        let first = tokio::spawn(async move { orchestrator.run_sync_cycle().await });
        while !fx.orchestrator.is_running() {
            tokio::task::yield_now().await;
        }
        let ops = fx.store.operation_count();

        let second = fx.orchestrator.run_sync_cycle().await;

        assert!(second.is_skipped());
        assert_eq!(fx.store.operation_count(), ops);
        assert!(first.await.unwrap().is_completed());
        assert!(!fx.orchestrator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_ticks_during_a_cycle_are_dropped() {
        use crate::scheduler::{Job, Scheduler};

        // Each cycle makes two gateway calls, so it lasts 2.5s.
        let gateway = StaticGateway::new().with_latency(std::time::Duration::from_millis(1250));
        let fx = Fixture::new(gateway, SyncConfig::default()).await;
        fx.add_user("r1").await;
        fx.gateway.set_calendars("r1", vec![]).await;

        let outcomes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let orchestrator = fx.orchestrator.clone();
        let recorded = outcomes.clone();
        let job = Job::new("sync", std::time::Duration::from_secs(1), move || {
            let orchestrator = orchestrator.clone();
            let recorded = recorded.clone();
            async move {
                let outcome = orchestrator.run_sync_cycle().await;
                recorded.lock().unwrap().push(outcome.is_skipped());
            }
        });
        let scheduler = Scheduler::new(vec![job]).unwrap();
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(std::time::Duration::from_millis(5200)).await;

        // Cycles ran from 0s and 3s; ticks at 1, 2, 4 and 5 were dropped.
        let outcomes = outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.iter().filter(|skipped| **skipped).count(), 4);
        assert_eq!(outcomes.iter().filter(|skipped| !**skipped).count(), 1);
        assert!(fx.orchestrator.is_running());

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_slow_gateway() {
        let gateway = StaticGateway::new().with_latency(std::time::Duration::from_secs(20 * 60));
        let config = SyncConfig::default().with_deadline(std::time::Duration::from_secs(600));
        let fx = Fixture::new(gateway, config).await;
        fx.add_user("r1").await;
        fx.gateway.set_calendars("r1", vec![]).await;

        let outcome = fx.orchestrator.run_sync_cycle().await;

        assert!(matches!(outcome.error(), Some(SyncError::DeadlineExceeded)));
        assert!(!fx.orchestrator.is_running());
    }

    #[tokio::test]
    async fn shutdown_cancels_cycles() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        fx.add_user("r1").await;
        fx.orchestrator.shutdown_token().cancel();

        let outcome = fx.orchestrator.run_sync_cycle().await;

        assert!(matches!(outcome.error(), Some(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn remote_update_flows_into_history() {
        let fx = Fixture::new(StaticGateway::new(), SyncConfig::default()).await;
        let user = fx.add_user("r1").await;
        let t1 = now() - ChronoDuration::days(2);
        let t2 = now() - ChronoDuration::days(1);
        fx.gateway
            .set_calendars("r1", vec![RemoteCalendar::new("work", "Work")])
            .await;
        fx.gateway
            .set_events("r1", "work", vec![remote("e1", "Standup", t1)])
            .await;
        fx.orchestrator.run_sync_cycle().await;

        fx.gateway
            .set_events("r1", "work", vec![remote("e1", "Standup*", t2)])
            .await;
        let outcome = fx.orchestrator.run_sync_cycle().await;

        assert_eq!(outcome.report().unwrap().events.updated, 1);
        let calendar = fx.store.list_calendars(user.id).await.unwrap().remove(0);
        let history = fx
            .store
            .list_calendar_event_history(calendar.id)
            .await
            .unwrap();
        let kinds: Vec<_> = history.iter().map(|h| h.change_type).collect();
        assert_eq!(kinds, vec![ChangeType::Created, ChangeType::Updated]);
    }
}
