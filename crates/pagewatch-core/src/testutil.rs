//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ChangeRecord, ChangeType, FetchedPage, Importance, Target};
use crate::notify::{ChangeNotice, ChannelKind, ChannelSender, Delivery, DispatchReport};
use crate::scheduler::{SchedulerEvent, SchedulerReporter};
use crate::traits::{Notifier, PageFetcher};

/// A 200 response with the given text content.
pub fn page(content: &str) -> FetchedPage {
    FetchedPage {
        content: content.to_string(),
        title: "Test page".to_string(),
        status_code: 200,
        response_time_ms: 42,
    }
}

/// A significant change record for `target_id`.
pub fn sample_change(target_id: Uuid) -> ChangeRecord {
    ChangeRecord {
        id: Uuid::new_v4(),
        target_id,
        previous_snapshot_id: Uuid::new_v4(),
        current_snapshot_id: Uuid::new_v4(),
        detected_at: Utc::now(),
        change_type: ChangeType::Content,
        summary: "Detected changes on Pricing: 12 words added, 3 words removed.".to_string(),
        diff: Vec::new(),
        importance: Importance::Medium,
        notified: false,
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns queued pages.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default page.
    responses: Arc<Mutex<Vec<Result<FetchedPage, AppError>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new(content: &str) -> Self {
        Self::with_pages(vec![Ok(page(content))])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_pages(vec![Err(error)])
    }

    pub fn with_pages(responses: Vec<Result<FetchedPage, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fetched: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleep before answering, to keep a check in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl PageFetcher for MockFetcher {
    async fn fetch(&self, target: &Target) -> Result<FetchedPage, AppError> {
        self.fetched.lock().unwrap().push(target.url.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(page("default content"))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// Mock notifier that records calls and reports a fixed set of channels as sent.
#[derive(Clone)]
pub struct MockNotifier {
    sent: Vec<ChannelKind>,
    calls: Arc<Mutex<Vec<(Uuid, Uuid)>>>,
}

impl MockNotifier {
    /// An empty `sent` list simulates every channel failing.
    pub fn sending(sent: &[ChannelKind]) -> Self {
        Self {
            sent: sent.to_vec(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Recorded (target_id, change_id) pairs.
    pub fn calls(&self) -> Vec<(Uuid, Uuid)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    async fn send_all(&self, target: &Target, change: &ChangeRecord) -> DispatchReport {
        self.calls.lock().unwrap().push((target.id, change.id));
        let failed = if self.sent.is_empty() {
            vec![ChannelKind::Webhook]
        } else {
            Vec::new()
        };
        DispatchReport {
            sent: self.sent.clone(),
            failed,
        }
    }
}

// ---------------------------------------------------------------------------
// MockChannelSender
// ---------------------------------------------------------------------------

/// Recorded delivery attempt.
pub type AttemptRecord = (Delivery, ChangeNotice);

/// Mock channel sender: succeeds unless a failure was registered for the channel.
#[derive(Clone, Default)]
pub struct MockChannelSender {
    failures: Arc<Mutex<HashMap<ChannelKind, String>>>,
    attempts: Arc<Mutex<Vec<AttemptRecord>>>,
    credentials: HashSet<ChannelKind>,
    delay: Option<Duration>,
}

impl MockChannelSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, kind: ChannelKind, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(kind, message.to_string());
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_credentials(mut self, kinds: &[ChannelKind]) -> Self {
        self.credentials.extend(kinds.iter().copied());
        self
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.lock().unwrap().clone()
    }
}

impl ChannelSender for MockChannelSender {
    async fn attempt(&self, delivery: &Delivery, notice: &ChangeNotice) -> Result<(), AppError> {
        self.attempts
            .lock()
            .unwrap()
            .push((delivery.clone(), notice.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().unwrap().get(&delivery.kind()).cloned();
        match failure {
            Some(message) => Err(AppError::notification(delivery.kind().as_str(), message)),
            None => Ok(()),
        }
    }

    fn has_credentials(&self, kind: ChannelKind) -> bool {
        self.credentials.contains(&kind)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    events: Mutex<Vec<String>>,
}

impl MockReporter {
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl SchedulerReporter for MockReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        let label = match event {
            SchedulerEvent::Started { .. } => "started",
            SchedulerEvent::TargetScheduled { .. } => "target_scheduled",
            SchedulerEvent::TargetUnscheduled { .. } => "target_unscheduled",
            SchedulerEvent::CheckSkipped { .. } => "check_skipped",
            SchedulerEvent::CheckStarted { .. } => "check_started",
            SchedulerEvent::ChangeIgnored { .. } => "change_ignored",
            SchedulerEvent::ChangeDetected { .. } => "change_detected",
            SchedulerEvent::NotificationsSent { .. } => "notifications_sent",
            SchedulerEvent::CheckCompleted { .. } => "check_completed",
            SchedulerEvent::CheckFailed { .. } => "check_failed",
            SchedulerEvent::Stopped { .. } => "stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
