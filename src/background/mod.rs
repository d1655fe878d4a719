//! The Scheduler Loop: periodic due-task sweeps.
//!
//! Every tick loads the recurring tasks and then the one-off tasks that carry
//! a due date, evaluates each one, and dispatches a `task_due` notice to the
//! owner of every due task. `lastNotifiedAt` is written back only when at
//! least one channel took the notice, so a user who was offline gets it on a
//! later pass.
//!
//! A failure on one task is logged and the pass moves on; it never ends the
//! loop. Only cancellation does.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::due::{self, Unschedulable, Verdict};
use crate::realtime::{Dispatcher, Notice, RealtimeError};
use crate::store::{StoreError, TaskFilter, TaskStore};
use crate::tasks::{Task, TaskPatch};

#[derive(Debug, Error)]
enum TaskFailure {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] RealtimeError),
}

/// Tallies for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub evaluated: usize,
    pub due: usize,
    /// Due tasks that reached at least one channel and were stamped.
    pub notified: usize,
    pub failed: usize,
}

enum Outcome {
    NotDue,
    Skipped,
    Undelivered,
    Notified,
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    dispatcher: Dispatcher,
    interval: Duration,
    min_gap: TimeDelta,
    // Held for the length of a pass; a second pass that finds it taken backs off.
    running: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Dispatcher,
        interval: Duration,
        min_gap: TimeDelta,
    ) -> Self {
        Self {
            store,
            dispatcher,
            interval,
            min_gap,
            running: Mutex::new(()),
        }
    }

    /// Runs one pass immediately, then one per interval, until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?self.interval, "scheduler started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_pass(Local::now()).await;
                    }
                }
            }

            info!("scheduler stopped");
        })
    }

    /// Sweeps every scheduled task once at `now`.
    ///
    /// Returns `None` without doing anything if another pass is still running.
    pub async fn run_pass<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<PassReport> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("previous sweep still running, skipping this one");
            return None;
        };

        let mut report = PassReport::default();
        for filter in [TaskFilter::recurring(), TaskFilter::with_due_date()] {
            let tasks = match self.store.find_all(&filter).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(error = %e, ?filter, "failed to load tasks for sweep");
                    report.failed += 1;
                    continue;
                }
            };

            for task in &tasks {
                report.evaluated += 1;
                match self.process(task, &now).await {
                    Ok(Outcome::NotDue | Outcome::Skipped) => {}
                    Ok(Outcome::Undelivered) => report.due += 1,
                    Ok(Outcome::Notified) => {
                        report.due += 1;
                        report.notified += 1;
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "failed to process task");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            evaluated = report.evaluated,
            due = report.due,
            notified = report.notified,
            failed = report.failed,
            "sweep finished"
        );
        Some(report)
    }

    async fn process<Tz: TimeZone>(
        &self,
        task: &Task,
        now: &DateTime<Tz>,
    ) -> Result<Outcome, TaskFailure> {
        match due::evaluate(task, now, self.min_gap) {
            Verdict::Due => {}
            Verdict::NotDue => return Ok(Outcome::NotDue),
            Verdict::Suppressed { since_last } => {
                debug!(task_id = %task.id, ?since_last, "due but notified recently");
                return Ok(Outcome::NotDue);
            }
            Verdict::Unschedulable(Unschedulable::InvalidDueDate(raw)) => {
                warn!(task_id = %task.id, due_date = %raw, "unparseable due date, skipping");
                return Ok(Outcome::Skipped);
            }
            Verdict::Unschedulable(Unschedulable::NoSchedule) => return Ok(Outcome::Skipped),
        }

        let notice = Notice::task_due(task.id.clone(), &task.title);
        let delivered = self.dispatcher.dispatch(&task.owner_id, &notice).await?;
        if delivered == 0 {
            debug!(task_id = %task.id, user_id = %task.owner_id, "owner offline, will retry");
            return Ok(Outcome::Undelivered);
        }

        self.store
            .update_fields(&task.id, TaskPatch::notified_at(now.with_timezone(&Utc)))
            .await?;
        debug!(task_id = %task.id, delivered, "task due notification sent");
        Ok(Outcome::Notified)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::realtime::registry::tests::FakeChannel;
    use crate::realtime::{ChannelHandle, ConnectionRegistry};
    use crate::store::MemoryStore;
    use crate::tasks::{TaskId, UserId};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn daily(id: &str, owner: &str) -> Task {
        Task {
            id: TaskId::from(id),
            title: format!("task {id}"),
            details: String::new(),
            recurring: true,
            frequency: Some("Every Day".into()),
            owner_id: UserId::from(owner),
            created_at: Some(at(2024, 1, 1, 9)),
            completed_dates: vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()],
            due_date: None,
            last_notified_at: None,
            updated_at: None,
        }
    }

    fn deadline(id: &str, owner: &str, due: &str) -> Task {
        Task {
            recurring: false,
            frequency: None,
            completed_dates: Vec::new(),
            due_date: Some(due.into()),
            ..daily(id, owner)
        }
    }

    struct Harness {
        store: Arc<dyn TaskStore>,
        registry: Arc<ConnectionRegistry>,
        scheduler: Scheduler,
    }

    fn harness(store: Arc<dyn TaskStore>) -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Dispatcher::new(Arc::clone(&registry)),
            Duration::from_secs(300),
            TimeDelta::hours(24),
        );
        Harness {
            store,
            registry,
            scheduler,
        }
    }

    async fn connect(registry: &ConnectionRegistry, user: &str) -> Arc<FakeChannel> {
        let channel = Arc::new(FakeChannel::default());
        let handle: ChannelHandle = channel.clone();
        registry.register(UserId::from(user), handle).await;
        channel
    }

    #[tokio::test]
    async fn back_to_back_passes_notify_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert(daily("t1", "ada")).await.unwrap();
        store
            .insert(deadline("t2", "ada", "2024-06-01T00:00:00Z"))
            .await
            .unwrap();
        let h = harness(store);
        let channel = connect(&h.registry, "ada").await;

        let now = at(2024, 6, 2, 8);
        let first = h.scheduler.run_pass(now).await.unwrap();
        assert_eq!(first.evaluated, 2);
        assert_eq!(first.notified, 2);

        let second = h.scheduler.run_pass(now + TimeDelta::minutes(5)).await.unwrap();
        assert_eq!(second.notified, 0);
        assert_eq!(channel.frames().len(), 2);

        let stamped = h.store.find_one(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stamped.last_notified_at, Some(now));
    }

    #[tokio::test]
    async fn offline_owner_is_not_stamped() {
        let store = Arc::new(MemoryStore::new());
        store.insert(daily("t1", "ada")).await.unwrap();
        let h = harness(store);

        let report = h.scheduler.run_pass(at(2024, 6, 2, 8)).await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.notified, 0);

        let task = h.store.find_one(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(task.last_notified_at, None);

        // Reconnecting makes it eligible again on the next pass.
        let channel = connect(&h.registry, "ada").await;
        let report = h.scheduler.run_pass(at(2024, 6, 2, 9)).await.unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(channel.frames().len(), 1);
    }

    #[tokio::test]
    async fn malformed_due_date_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.insert(deadline("bad", "ada", "next tuesday")).await.unwrap();
        let h = harness(store);
        let channel = connect(&h.registry, "ada").await;

        let report = h.scheduler.run_pass(at(2024, 6, 2, 8)).await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.due, 0);
        assert_eq!(report.failed, 0);
        assert!(channel.frames().is_empty());
    }

    /// Memory store whose field updates fail for one task.
    struct FlakyStore {
        inner: MemoryStore,
        poisoned: TaskId,
        fail_recurring_scan: AtomicBool,
    }

    #[async_trait]
    impl TaskStore for FlakyStore {
        async fn find_all(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
            if filter.recurring == Some(true) && self.fail_recurring_scan.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("scan timed out".into()));
            }
            self.inner.find_all(filter).await
        }

        async fn find_one(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
            self.inner.find_one(id).await
        }

        async fn insert(&self, task: Task) -> Result<TaskId, StoreError> {
            self.inner.insert(task).await
        }

        async fn update_fields(&self, id: &TaskId, patch: TaskPatch) -> Result<(), StoreError> {
            if id == &self.poisoned {
                return Err(StoreError::Backend("write rejected".into()));
            }
            self.inner.update_fields(id, patch).await
        }

        async fn delete_one(&self, id: &TaskId) -> Result<(), StoreError> {
            self.inner.delete_one(id).await
        }

        async fn delete_many(&self, filter: &TaskFilter) -> Result<usize, StoreError> {
            self.inner.delete_many(filter).await
        }
    }

    #[tokio::test]
    async fn one_failing_task_does_not_abort_the_pass() {
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            poisoned: TaskId::from("t1"),
            fail_recurring_scan: AtomicBool::new(false),
        });
        flaky.insert(daily("t1", "ada")).await.unwrap();
        flaky.insert(daily("t2", "ada")).await.unwrap();
        flaky
            .insert(deadline("t3", "ada", "2024-06-01"))
            .await
            .unwrap();
        let h = harness(flaky.clone());
        connect(&h.registry, "ada").await;

        let report = h.scheduler.run_pass(at(2024, 6, 2, 8)).await.unwrap();
        assert_eq!(report.evaluated, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.notified, 2);

        flaky.fail_recurring_scan.store(true, Ordering::SeqCst);
        let report = h.scheduler.run_pass(at(2024, 6, 3, 8)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.evaluated, 1);
    }

    #[tokio::test]
    async fn overlapping_pass_backs_off() {
        let h = harness(Arc::new(MemoryStore::new()));
        let _held = h.scheduler.running.lock().await;
        assert!(h.scheduler.run_pass(at(2024, 6, 2, 8)).await.is_none());
    }

    #[tokio::test]
    async fn spawned_loop_runs_immediately_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        store.insert(daily("t1", "ada")).await.unwrap();
        let h = harness(store);
        let channel = connect(&h.registry, "ada").await;

        let scheduler = Arc::new(h.scheduler);
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&scheduler).spawn(cancel.clone());

        for _ in 0..50 {
            if !channel.frames().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(channel.frames().len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
