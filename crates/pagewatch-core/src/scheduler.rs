//! Per-target check scheduling.
//!
//! Every scheduled target owns one timer task. Each tick spawns an
//! independent check; a check that is still running when the next tick
//! fires makes that tick a no-op instead of queueing behind it.
//!
//! ```text
//! Unscheduled --schedule--> Scheduled --tick--> Checking --done--> Scheduled
//!      ^                        |
//!      +-------unschedule-------+
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::detect::{classify, detect_change, is_noise_only};
use crate::error::AppError;
use crate::models::{ChangeRecord, CheckInterval, Importance, Snapshot, Target, TargetPatch};
use crate::notify::DispatchReport;
use crate::traits::{Notifier, PageFetcher, Storage};

/// Events emitted by the scheduler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum SchedulerEvent<'a> {
    Started {
        targets: usize,
    },
    TargetScheduled {
        target_id: Uuid,
        interval: CheckInterval,
        immediate: bool,
    },
    TargetUnscheduled {
        target_id: Uuid,
    },
    CheckSkipped {
        target_id: Uuid,
    },
    CheckStarted {
        target_id: Uuid,
        url: &'a str,
    },
    ChangeIgnored {
        target_id: Uuid,
        summary: &'a str,
    },
    ChangeDetected {
        target_id: Uuid,
        change_id: Uuid,
        importance: Importance,
    },
    NotificationsSent {
        target_id: Uuid,
        sent: usize,
        failed: usize,
    },
    CheckCompleted {
        target_id: Uuid,
        outcome: &'a str,
    },
    CheckFailed {
        target_id: Uuid,
        error: &'a str,
    },
    Stopped {
        timers_cancelled: usize,
    },
}

/// Trait for receiving scheduler events (decoupled logging).
pub trait SchedulerReporter: Send + Sync {
    fn report(&self, event: SchedulerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSchedulerReporter;

impl SchedulerReporter for TracingSchedulerReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        match event {
            SchedulerEvent::Started { targets } => {
                tracing::info!(%targets, "Scheduler started");
            }
            SchedulerEvent::TargetScheduled {
                target_id,
                interval,
                immediate,
            } => {
                tracing::info!(%target_id, %interval, %immediate, "Target scheduled");
            }
            SchedulerEvent::TargetUnscheduled { target_id } => {
                tracing::info!(%target_id, "Target unscheduled");
            }
            SchedulerEvent::CheckSkipped { target_id } => {
                tracing::debug!(%target_id, "Check already in progress, skipping");
            }
            SchedulerEvent::CheckStarted { target_id, url } => {
                tracing::info!(%target_id, %url, "Checking target");
            }
            SchedulerEvent::ChangeIgnored { target_id, summary } => {
                tracing::info!(%target_id, %summary, "Change below significance threshold");
            }
            SchedulerEvent::ChangeDetected {
                target_id,
                change_id,
                importance,
            } => {
                tracing::info!(%target_id, %change_id, %importance, "Change detected");
            }
            SchedulerEvent::NotificationsSent {
                target_id,
                sent,
                failed,
            } => {
                tracing::info!(%target_id, %sent, %failed, "Notifications dispatched");
            }
            SchedulerEvent::CheckCompleted { target_id, outcome } => {
                tracing::info!(%target_id, %outcome, "Check complete");
            }
            SchedulerEvent::CheckFailed { target_id, error } => {
                tracing::warn!(%target_id, %error, "Check failed");
            }
            SchedulerEvent::Stopped { timers_cancelled } => {
                tracing::info!(%timers_cancelled, "Scheduler stopped");
            }
        }
    }
}

/// Result of a single check cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Another check of the same target was already running.
    Skipped,
    /// The target no longer exists; its timer was cancelled.
    Missing,
    /// The target is disabled; its timer was cancelled.
    Disabled,
    /// First snapshot of the target.
    Baseline { snapshot_id: Uuid },
    Unchanged { snapshot_id: Uuid },
    /// Content changed but not enough to record.
    Insignificant { snapshot_id: Uuid, summary: String },
    Changed {
        change: ChangeRecord,
        report: DispatchReport,
    },
    Failed { error: String },
}

impl CheckOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Skipped => "skipped",
            CheckOutcome::Missing => "missing",
            CheckOutcome::Disabled => "disabled",
            CheckOutcome::Baseline { .. } => "baseline",
            CheckOutcome::Unchanged { .. } => "unchanged",
            CheckOutcome::Insignificant { .. } => "insignificant",
            CheckOutcome::Changed { .. } => "changed",
            CheckOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub scheduled_targets: usize,
    pub in_flight: usize,
}

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn cancel(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

struct SchedulerInner<F, S, N> {
    fetcher: F,
    storage: S,
    notifier: N,
    timers: Mutex<HashMap<Uuid, TimerHandle>>,
    in_flight: Mutex<HashSet<Uuid>>,
    running: AtomicBool,
    reporter: Arc<dyn SchedulerReporter>,
}

/// Releases the in-flight mark of a target when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    target_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.target_id);
    }
}

/// Acquires a mutex, recovering from poison if necessary.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned scheduler mutex");
        poisoned.into_inner()
    })
}

/// Cheaply cloneable handle to the scheduling engine.
pub struct Scheduler<F, S, N> {
    inner: Arc<SchedulerInner<F, S, N>>,
}

impl<F, S, N> Clone for Scheduler<F, S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, S, N> Scheduler<F, S, N>
where
    F: PageFetcher,
    S: Storage,
    N: Notifier,
{
    pub fn new(fetcher: F, storage: S, notifier: N) -> Self {
        Self::with_reporter(fetcher, storage, notifier, Arc::new(TracingSchedulerReporter))
    }

    pub fn with_reporter(
        fetcher: F,
        storage: S,
        notifier: N,
        reporter: Arc<dyn SchedulerReporter>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                fetcher,
                storage,
                notifier,
                timers: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                running: AtomicBool::new(false),
                reporter,
            }),
        }
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    pub fn notifier(&self) -> &N {
        &self.inner.notifier
    }

    /// Schedule every enabled target. Returns how many were scheduled.
    ///
    /// No-op when already running.
    pub async fn start(&self) -> Result<usize, AppError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        let targets = match self.inner.storage.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let mut scheduled = 0;
        for target in targets.iter().filter(|t| t.enabled) {
            if self.schedule_target(target) {
                scheduled += 1;
            }
        }

        self.inner
            .reporter
            .report(SchedulerEvent::Started { targets: scheduled });
        Ok(scheduled)
    }

    /// Cancel every timer. No-op when stopped.
    ///
    /// Checks already in progress run to completion.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let timers: Vec<TimerHandle> = lock(&self.inner.timers).drain().map(|(_, t)| t).collect();
        let timers_cancelled = timers.len();
        for timer in timers {
            timer.cancel();
        }

        self.inner
            .reporter
            .report(SchedulerEvent::Stopped { timers_cancelled });
    }

    /// (Re)arm the timer of a target. Returns whether a timer is armed.
    ///
    /// Nothing is armed while the scheduler is stopped or the target is
    /// disabled. A target never checked, or last checked more than one
    /// interval ago, gets an immediate check before the recurring timer starts.
    pub fn schedule_target(&self, target: &Target) -> bool {
        if !target.enabled {
            self.cancel_timer(target.id);
            return false;
        }

        let immediate = target.is_due(Utc::now());
        let target_id = target.id;

        {
            // `stop` clears `running` before draining this map, so checking
            // under the lock means no timer outlives a stop.
            let mut timers = lock(&self.inner.timers);
            if !self.is_running() {
                return false;
            }
            let timer = self.spawn_timer(target_id, target.check_interval.as_duration());
            if let Some(replaced) = timers.insert(target_id, timer) {
                replaced.cancel();
            }
        }

        self.inner.reporter.report(SchedulerEvent::TargetScheduled {
            target_id,
            interval: target.check_interval,
            immediate,
        });

        if immediate {
            self.spawn_check(target_id);
        }
        true
    }

    /// Cancel the timer of a target. Safe when it is not scheduled.
    pub fn unschedule_target(&self, target_id: Uuid) {
        if self.cancel_timer(target_id) {
            self.inner
                .reporter
                .report(SchedulerEvent::TargetUnscheduled { target_id });
        }
    }

    /// Reload a target from storage and re-arm or drop its timer.
    pub async fn reschedule(&self, target_id: Uuid) -> Result<bool, AppError> {
        match self.inner.storage.get_target(target_id).await? {
            Some(target) if target.enabled => Ok(self.schedule_target(&target)),
            _ => {
                self.unschedule_target(target_id);
                Ok(false)
            }
        }
    }

    /// Run one check cycle for a target. Never panics; failures are
    /// reported and returned as [`CheckOutcome::Failed`].
    pub async fn check_target(&self, target_id: Uuid) -> CheckOutcome {
        let Some(_guard) = self.begin_check(target_id) else {
            self.inner
                .reporter
                .report(SchedulerEvent::CheckSkipped { target_id });
            return CheckOutcome::Skipped;
        };

        match self.run_check(target_id).await {
            Ok(outcome) => {
                self.inner.reporter.report(SchedulerEvent::CheckCompleted {
                    target_id,
                    outcome: outcome.label(),
                });
                outcome
            }
            Err(e) => {
                let error = e.to_string();
                self.inner.reporter.report(SchedulerEvent::CheckFailed {
                    target_id,
                    error: &error,
                });
                CheckOutcome::Failed { error }
            }
        }
    }

    /// Check every enabled target concurrently. Returns how many were checked.
    pub async fn check_all(&self) -> Result<usize, AppError> {
        let targets = self.inner.storage.list_targets().await?;
        let checks: Vec<_> = targets
            .iter()
            .filter(|t| t.enabled)
            .map(|t| self.check_target(t.id))
            .collect();
        let count = checks.len();
        futures::future::join_all(checks).await;
        Ok(count)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            scheduled_targets: lock(&self.inner.timers).len(),
            in_flight: lock(&self.inner.in_flight).len(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_scheduled(&self, target_id: Uuid) -> bool {
        lock(&self.inner.timers).contains_key(&target_id)
    }

    pub fn is_in_flight(&self, target_id: Uuid) -> bool {
        lock(&self.inner.in_flight).contains(&target_id)
    }

    fn spawn_check(&self, target_id: Uuid) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.check_target(target_id).await;
        });
    }

    fn spawn_timer(&self, target_id: Uuid, interval: Duration) -> TimerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<SchedulerInner<F, S, N>> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        Scheduler { inner }.spawn_check(target_id);
                    }
                }
            }
        });
        TimerHandle { cancel, task }
    }

    fn cancel_timer(&self, target_id: Uuid) -> bool {
        let timer = lock(&self.inner.timers).remove(&target_id);
        match timer {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    fn begin_check(&self, target_id: Uuid) -> Option<InFlightGuard<'_>> {
        if !lock(&self.inner.in_flight).insert(target_id) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.inner.in_flight,
            target_id,
        })
    }

    async fn run_check(&self, target_id: Uuid) -> Result<CheckOutcome, AppError> {
        let inner = &self.inner;

        let Some(target) = inner.storage.get_target(target_id).await? else {
            self.unschedule_target(target_id);
            return Ok(CheckOutcome::Missing);
        };
        if !target.enabled {
            self.unschedule_target(target_id);
            return Ok(CheckOutcome::Disabled);
        }

        inner.reporter.report(SchedulerEvent::CheckStarted {
            target_id,
            url: &target.url,
        });

        let page = inner.fetcher.fetch(&target).await?;
        let current = Snapshot::capture(target.id, page);
        let previous = inner.storage.get_latest_snapshot(target.id).await?;

        // The snapshot goes first so the change record can reference it.
        inner.storage.save_snapshot(&current).await?;

        let outcome = match previous {
            None => CheckOutcome::Baseline {
                snapshot_id: current.id,
            },
            Some(previous) => self.compare(&target, &previous, &current).await?,
        };

        if let Err(e) = inner
            .storage
            .update_target(target.id, &TargetPatch::checked_at(current.captured_at))
            .await
        {
            tracing::warn!(target_id = %target.id, error = %e, "Failed to record check time");
        }

        Ok(outcome)
    }

    async fn compare(
        &self,
        target: &Target,
        previous: &Snapshot,
        current: &Snapshot,
    ) -> Result<CheckOutcome, AppError> {
        let inner = &self.inner;
        let unchanged = CheckOutcome::Unchanged {
            snapshot_id: current.id,
        };

        let detection = detect_change(previous, current);
        if !detection.has_changed {
            return Ok(unchanged);
        }
        if target.ignore_noise && is_noise_only(&previous.content, &current.content) {
            return Ok(unchanged);
        }

        let analysis = classify(&previous.content, &current.content, &target.name);
        if !analysis.is_significant {
            inner.reporter.report(SchedulerEvent::ChangeIgnored {
                target_id: target.id,
                summary: &analysis.summary,
            });
            return Ok(CheckOutcome::Insignificant {
                snapshot_id: current.id,
                summary: analysis.summary,
            });
        }

        let mut change = ChangeRecord {
            id: Uuid::new_v4(),
            target_id: target.id,
            previous_snapshot_id: previous.id,
            current_snapshot_id: current.id,
            detected_at: Utc::now(),
            change_type: detection.change_type,
            summary: analysis.summary,
            diff: detection.diff,
            importance: analysis.importance,
            notified: false,
        };
        if let Err(e) = inner.storage.save_change(&change).await {
            // Without the record, the next check must still diff against `previous`.
            if let Err(rollback) = inner.storage.delete_snapshot(current.id).await {
                tracing::warn!(
                    target_id = %target.id,
                    snapshot_id = %current.id,
                    error = %rollback,
                    "Failed to roll back snapshot"
                );
            }
            return Err(e);
        }
        if let Err(e) = inner
            .storage
            .update_target(target.id, &TargetPatch::changed_at(change.detected_at))
            .await
        {
            tracing::warn!(target_id = %target.id, error = %e, "Failed to record change time");
        }
        inner.reporter.report(SchedulerEvent::ChangeDetected {
            target_id: target.id,
            change_id: change.id,
            importance: change.importance,
        });

        let report = inner.notifier.send_all(target, &change).await;
        inner.reporter.report(SchedulerEvent::NotificationsSent {
            target_id: target.id,
            sent: report.sent.len(),
            failed: report.failed.len(),
        });
        if report.any_sent() {
            match inner.storage.mark_change_notified(change.id).await {
                Ok(()) => change.notified = true,
                Err(e) => {
                    tracing::warn!(change_id = %change.id, error = %e, "Failed to mark change notified");
                }
            }
        }

        Ok(CheckOutcome::Changed { change, report })
    }
}
