use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Target configuration
// ---------------------------------------------------------------------------

/// How often a target is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckInterval {
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[default]
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "6hour")]
    SixHours,
    #[serde(rename = "1day")]
    OneDay,
}

impl CheckInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInterval::FiveMinutes => "5min",
            CheckInterval::FifteenMinutes => "15min",
            CheckInterval::ThirtyMinutes => "30min",
            CheckInterval::OneHour => "1hour",
            CheckInterval::SixHours => "6hour",
            CheckInterval::OneDay => "1day",
        }
    }

    pub fn as_duration(&self) -> Duration {
        let minutes = match self {
            CheckInterval::FiveMinutes => 5,
            CheckInterval::FifteenMinutes => 15,
            CheckInterval::ThirtyMinutes => 30,
            CheckInterval::OneHour => 60,
            CheckInterval::SixHours => 6 * 60,
            CheckInterval::OneDay => 24 * 60,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl fmt::Display for CheckInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "5min" => Ok(CheckInterval::FiveMinutes),
            "15min" => Ok(CheckInterval::FifteenMinutes),
            "30min" => Ok(CheckInterval::ThirtyMinutes),
            "1hour" => Ok(CheckInterval::OneHour),
            "6hour" => Ok(CheckInterval::SixHours),
            "1day" => Ok(CheckInterval::OneDay),
            _ => Err(format!(
                "Unknown check interval: {s} (expected 5min, 15min, 30min, 1hour, 6hour or 1day)"
            )),
        }
    }
}

/// Strategy used to obtain a page's HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Static,
    Browser,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Static => "static",
            RenderMode::Browser => "browser",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(RenderMode::Static),
            "browser" => Ok(RenderMode::Browser),
            _ => Err(format!("Unknown render mode: {s}")),
        }
    }
}

/// How the response body is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    #[default]
    Html,
    Json,
}

/// Per-target request customisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw `Cookie` header value.
    pub cookies: Option<String>,
    /// Preset name (`chrome`, `googlebot`, …) or a literal User-Agent string.
    pub user_agent: Option<String>,
    #[serde(default)]
    pub content_mode: ContentMode,
    pub timeout_ms: Option<u64>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Notification endpoints configured on a single target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyChannels {
    pub email: Option<String>,
    pub webhook: Option<String>,
    /// Telegram chat id; the bot token is process-wide.
    pub telegram: Option<String>,
    pub discord: Option<String>,
    pub feishu: Option<String>,
    pub wecom: Option<String>,
    /// ServerChan send key.
    pub serverchan: Option<String>,
}

/// A monitored URL with its fetch and notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub url: String,
    pub name: String,
    /// CSS selector in HTML mode, path expression in JSON mode.
    pub selector: Option<String>,
    #[serde(default)]
    pub check_interval: CheckInterval,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub render_mode: RenderMode,
    /// Extra selector to wait for after navigation (browser mode only).
    pub wait_for_selector: Option<String>,
    #[serde(default)]
    pub fetch_config: Option<FetchConfig>,
    /// Proxy URL overriding the shared pool.
    pub proxy: Option<String>,
    #[serde(default)]
    pub notify: NotifyChannels,
    /// Mask dates, times and counters before deciding whether content changed.
    #[serde(default)]
    pub ignore_noise: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl Target {
    /// Create an enabled, static-mode target checked hourly.
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            name: name.into(),
            selector: None,
            check_interval: CheckInterval::default(),
            enabled: true,
            render_mode: RenderMode::Static,
            wait_for_selector: None,
            fetch_config: None,
            proxy: None,
            notify: NotifyChannels::default(),
            ignore_noise: false,
            created_at: Utc::now(),
            last_checked_at: None,
            last_changed_at: None,
        }
    }

    pub fn with_interval(mut self, interval: CheckInterval) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn content_mode(&self) -> ContentMode {
        self.fetch_config
            .as_ref()
            .map(|c| c.content_mode)
            .unwrap_or_default()
    }

    /// True if the target was never checked or its last check is older than
    /// one interval.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed > self.check_interval.as_duration())
                .unwrap_or(false),
        }
    }
}

/// Partial update applied to a stored target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub check_interval: Option<CheckInterval>,
    pub enabled: Option<bool>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
}

impl TargetPatch {
    pub fn checked_at(at: DateTime<Utc>) -> Self {
        Self {
            last_checked_at: Some(at),
            ..Default::default()
        }
    }

    pub fn changed_at(at: DateTime<Utc>) -> Self {
        Self {
            last_changed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn apply(&self, target: &mut Target) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(url) = &self.url {
            target.url = url.clone();
        }
        if let Some(interval) = self.check_interval {
            target.check_interval = interval;
        }
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(at) = self.last_checked_at {
            target.last_checked_at = Some(at);
        }
        if let Some(at) = self.last_changed_at {
            target.last_changed_at = Some(at);
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Normalized output of a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub content: String,
    pub title: String,
    /// 0 when a browser render captured no navigation response.
    pub status_code: u16,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub title: Option<String>,
    pub status_code: u16,
    pub response_time_ms: u64,
}

/// Immutable capture of a target's content at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub target_id: Uuid,
    pub content: String,
    /// SHA-256 of `content`
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    /// Wrap a fetched page into a new snapshot captured now.
    pub fn capture(target_id: Uuid, page: FetchedPage) -> Self {
        let content_hash = compute_hash(&page.content);
        let title = (!page.title.is_empty()).then_some(page.title);
        Self {
            id: Uuid::new_v4(),
            target_id,
            content: page.content,
            content_hash,
            captured_at: Utc::now(),
            metadata: SnapshotMetadata {
                title,
                status_code: page.status_code,
                response_time_ms: page.response_time_ms,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[default]
    Content,
    Structure,
    Both,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Content => "content",
            ChangeType::Structure => "structure",
            ChangeType::Both => "both",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(ChangeType::Content),
            "structure" => Ok(ChangeType::Structure),
            "both" => Ok(ChangeType::Both),
            _ => Err(format!("Unknown change type: {s}")),
        }
    }
}

/// Magnitude tier of a significant change. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        }
    }

    /// Human-readable label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Importance::High => "🔴 High",
            Importance::Medium => "🟡 Medium",
            Importance::Low => "⚪ Low",
        }
    }

    /// RGB colour used by chat cards and emails.
    pub fn color(&self) -> u32 {
        match self {
            Importance::High => 0xef4444,
            Importance::Medium => 0xf59e0b,
            Importance::Low => 0x6b7280,
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Importance::Low),
            "medium" => Ok(Importance::Medium),
            "high" => Ok(Importance::High),
            _ => Err(format!("Unknown importance: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Added,
    Removed,
    Context,
}

/// One line of a change diff. `text` is already HTML-escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

impl DiffLine {
    pub fn render(&self) -> String {
        let prefix = match self.kind {
            DiffLineKind::Added => "+ ",
            DiffLineKind::Removed => "- ",
            DiffLineKind::Context => "  ",
        };
        format!("{prefix}{}", self.text)
    }
}

/// A significant transition between two consecutive snapshots of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub target_id: Uuid,
    pub previous_snapshot_id: Uuid,
    pub current_snapshot_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub change_type: ChangeType,
    pub summary: String,
    pub diff: Vec<DiffLine>,
    pub importance: Importance,
    pub notified: bool,
}

impl ChangeRecord {
    /// Plain-text rendering of the diff, one prefixed line per entry.
    pub fn diff_text(&self) -> String {
        self.diff
            .iter()
            .map(DiffLine::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
