use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pagewatch_core::models::{ChangeRecord, Importance};
use pagewatch_core::notify::{ChannelKind, DispatchReport};
use pagewatch_core::proxy_pool::ProxyEntry;
use pagewatch_core::scheduler::CheckOutcome;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `ok` or `error`.
    pub storage: String,
    pub scheduler_running: bool,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerAction {
    Start,
    Stop,
    Check,
    CheckAll,
    Reschedule,
}

#[derive(Debug, Deserialize)]
pub struct SchedulerRequest {
    pub action: SchedulerAction,
    pub target_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Default)]
pub struct SchedulerActionResponse {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<usize>,
    /// After `reschedule`: false when the target is missing or disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_scheduled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckResponse>,
}

/// Flattened [`CheckOutcome`].
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<DispatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChangeSummary {
    pub id: Uuid,
    pub importance: Importance,
    pub summary: String,
    pub diff: String,
}

impl From<&ChangeRecord> for ChangeSummary {
    fn from(change: &ChangeRecord) -> Self {
        Self {
            id: change.id,
            importance: change.importance,
            summary: change.summary.clone(),
            diff: change.diff_text(),
        }
    }
}

impl From<CheckOutcome> for CheckResponse {
    fn from(outcome: CheckOutcome) -> Self {
        let mut response = CheckResponse {
            outcome: outcome.label().to_string(),
            snapshot_id: None,
            summary: None,
            change: None,
            notifications: None,
            error: None,
        };
        match outcome {
            CheckOutcome::Baseline { snapshot_id } | CheckOutcome::Unchanged { snapshot_id } => {
                response.snapshot_id = Some(snapshot_id);
            }
            CheckOutcome::Insignificant {
                snapshot_id,
                summary,
            } => {
                response.snapshot_id = Some(snapshot_id);
                response.summary = Some(summary);
            }
            CheckOutcome::Changed { change, report } => {
                response.snapshot_id = Some(change.current_snapshot_id);
                response.summary = Some(change.summary.clone());
                response.change = Some(ChangeSummary::from(&change));
                response.notifications = Some(report);
            }
            CheckOutcome::Failed { error } => response.error = Some(error),
            CheckOutcome::Skipped | CheckOutcome::Missing | CheckOutcome::Disabled => {}
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Proxies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProxyRequest {
    Add {
        url: String,
        label: Option<String>,
    },
    Set {
        proxies: Vec<ProxyEntry>,
    },
    Reset,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NotificationTestRequest {
    pub channel: ChannelKind,
    /// Target whose endpoints are used; process-wide defaults otherwise.
    pub target: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct NotificationTestResponse {
    pub channel: ChannelKind,
    pub sent: bool,
}
