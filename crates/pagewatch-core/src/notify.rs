//! Notification fan-out.
//!
//! The dispatcher resolves which channels a change should go to, then hands
//! each delivery to a [`ChannelSender`]. Channel failures are isolated: one
//! failing endpoint never prevents the others from being attempted.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ChangeRecord, Importance, NotifyChannels, Target};
use crate::traits::Notifier;

/// Upper bound for a single channel attempt.
pub const CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
    Feishu,
    ServerChan,
    WeCom,
    Telegram,
    Discord,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 7] = [
        ChannelKind::Email,
        ChannelKind::Webhook,
        ChannelKind::Feishu,
        ChannelKind::ServerChan,
        ChannelKind::WeCom,
        ChannelKind::Telegram,
        ChannelKind::Discord,
    ];

    /// Channels that can be configured process-wide and show up in status.
    pub const GLOBAL: [ChannelKind; 5] = [
        ChannelKind::Email,
        ChannelKind::Feishu,
        ChannelKind::WeCom,
        ChannelKind::ServerChan,
        ChannelKind::Telegram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Feishu => "feishu",
            ChannelKind::ServerChan => "serverchan",
            ChannelKind::WeCom => "wecom",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Discord => "discord",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown notification channel: {s}"))
    }
}

/// One concrete delivery, carrying only its endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum Delivery {
    Email { to: String },
    Webhook { url: String },
    Feishu { webhook: String },
    ServerChan { send_key: String },
    WeCom { webhook: String },
    Telegram { chat_id: String },
    Discord { webhook: String },
}

impl Delivery {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Delivery::Email { .. } => ChannelKind::Email,
            Delivery::Webhook { .. } => ChannelKind::Webhook,
            Delivery::Feishu { .. } => ChannelKind::Feishu,
            Delivery::ServerChan { .. } => ChannelKind::ServerChan,
            Delivery::WeCom { .. } => ChannelKind::WeCom,
            Delivery::Telegram { .. } => ChannelKind::Telegram,
            Delivery::Discord { .. } => ChannelKind::Discord,
        }
    }
}

/// Process-wide endpoints used when a target does not configure its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifierDefaults {
    pub feishu_webhook: Option<String>,
    pub wecom_webhook: Option<String>,
    pub serverchan_key: Option<String>,
}

/// Everything a channel needs to render its message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub target_id: Uuid,
    pub target_name: String,
    pub target_url: String,
    pub change_id: Uuid,
    pub summary: String,
    pub importance: Importance,
    pub detected_at: DateTime<Utc>,
    /// Pre-rendered HTML email body; a default is rendered when absent.
    pub email_body: Option<String>,
}

impl ChangeNotice {
    pub fn new(target: &Target, change: &ChangeRecord) -> Self {
        Self {
            target_id: target.id,
            target_name: target.name.clone(),
            target_url: target.url.clone(),
            change_id: change.id,
            summary: change.summary.clone(),
            importance: change.importance,
            detected_at: change.detected_at,
            email_body: None,
        }
    }

    /// Sample notice used by test sends.
    pub fn sample(target: &Target) -> Self {
        Self {
            target_id: target.id,
            target_name: target.name.clone(),
            target_url: target.url.clone(),
            change_id: Uuid::new_v4(),
            summary: format!("Test notification for {}.", target.name),
            importance: Importance::Low,
            detected_at: Utc::now(),
            email_body: None,
        }
    }

    pub fn with_email_body(mut self, body: Option<&str>) -> Self {
        self.email_body = body.map(str::to_string);
        self
    }
}

/// Outcome of a fan-out. Every attempted channel lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub sent: Vec<ChannelKind>,
    pub failed: Vec<ChannelKind>,
}

impl DispatchReport {
    pub fn any_sent(&self) -> bool {
        !self.sent.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub channel: ChannelKind,
    pub configured: bool,
}

/// Capability to deliver a notice over one concrete channel.
pub trait ChannelSender: Send + Sync + Clone + 'static {
    fn attempt(
        &self,
        delivery: &Delivery,
        notice: &ChangeNotice,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Whether process-wide credentials exist for `kind` (SMTP, bot token).
    fn has_credentials(&self, kind: ChannelKind) -> bool;
}

/// Work out the deliveries for a target. A target endpoint wins over the
/// process-wide default for the same channel.
pub fn resolve_deliveries(channels: &NotifyChannels, defaults: &NotifierDefaults) -> Vec<Delivery> {
    let mut deliveries = Vec::new();

    if let Some(to) = &channels.email {
        deliveries.push(Delivery::Email { to: to.clone() });
    }
    if let Some(url) = &channels.webhook {
        deliveries.push(Delivery::Webhook { url: url.clone() });
    }
    if let Some(webhook) = channels.feishu.as_ref().or(defaults.feishu_webhook.as_ref()) {
        deliveries.push(Delivery::Feishu {
            webhook: webhook.clone(),
        });
    }
    if let Some(key) = channels
        .serverchan
        .as_ref()
        .or(defaults.serverchan_key.as_ref())
    {
        deliveries.push(Delivery::ServerChan {
            send_key: key.clone(),
        });
    }
    if let Some(webhook) = channels.wecom.as_ref().or(defaults.wecom_webhook.as_ref()) {
        deliveries.push(Delivery::WeCom {
            webhook: webhook.clone(),
        });
    }
    if let Some(chat_id) = &channels.telegram {
        deliveries.push(Delivery::Telegram {
            chat_id: chat_id.clone(),
        });
    }
    if let Some(webhook) = &channels.discord {
        deliveries.push(Delivery::Discord {
            webhook: webhook.clone(),
        });
    }

    deliveries
}

/// Multi-channel dispatcher with per-channel failure isolation.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher<S> {
    sender: S,
    defaults: NotifierDefaults,
    timeout: Duration,
}

impl<S: ChannelSender> NotificationDispatcher<S> {
    pub fn new(sender: S, defaults: NotifierDefaults) -> Self {
        Self {
            sender,
            defaults,
            timeout: CHANNEL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Notify every channel configured for `target` about `change`.
    pub async fn send_all(
        &self,
        target: &Target,
        change: &ChangeRecord,
        email_body: Option<&str>,
    ) -> DispatchReport {
        let deliveries = resolve_deliveries(&target.notify, &self.defaults);
        let notice = ChangeNotice::new(target, change).with_email_body(email_body);
        self.dispatch(&deliveries, &notice).await
    }

    /// Attempt each delivery in turn, recording the outcome per channel.
    pub async fn dispatch(&self, deliveries: &[Delivery], notice: &ChangeNotice) -> DispatchReport {
        let mut report = DispatchReport::default();
        for delivery in deliveries {
            let kind = delivery.kind();
            match self.attempt(delivery, notice).await {
                Ok(()) => {
                    tracing::info!(channel = %kind, target_id = %notice.target_id, "Notification sent");
                    report.sent.push(kind);
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %kind,
                        target_id = %notice.target_id,
                        error = %e,
                        "Notification failed"
                    );
                    report.failed.push(kind);
                }
            }
        }
        report
    }

    /// Send a sample notice through a single channel of `target`.
    pub async fn send_test(&self, kind: ChannelKind, target: &Target) -> Result<(), AppError> {
        let delivery = resolve_deliveries(&target.notify, &self.defaults)
            .into_iter()
            .find(|d| d.kind() == kind)
            .ok_or_else(|| {
                AppError::ConfigError(format!("No {kind} endpoint configured for this target"))
            })?;
        self.attempt(&delivery, &ChangeNotice::sample(target)).await
    }

    /// Which process-wide channels are usable.
    pub fn status(&self) -> Vec<ChannelStatus> {
        ChannelKind::GLOBAL
            .into_iter()
            .map(|channel| {
                let default_endpoint = match channel {
                    ChannelKind::Feishu => self.defaults.feishu_webhook.is_some(),
                    ChannelKind::WeCom => self.defaults.wecom_webhook.is_some(),
                    ChannelKind::ServerChan => self.defaults.serverchan_key.is_some(),
                    _ => false,
                };
                ChannelStatus {
                    channel,
                    configured: default_endpoint || self.sender.has_credentials(channel),
                }
            })
            .collect()
    }

    async fn attempt(&self, delivery: &Delivery, notice: &ChangeNotice) -> Result<(), AppError> {
        match tokio::time::timeout(self.timeout, self.sender.attempt(delivery, notice)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}

impl<S: ChannelSender> Notifier for NotificationDispatcher<S> {
    async fn send_all(&self, target: &Target, change: &ChangeRecord) -> DispatchReport {
        NotificationDispatcher::send_all(self, target, change, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockChannelSender, sample_change};

    fn target_with(channels: NotifyChannels) -> Target {
        let mut target = Target::new("https://example.com/pricing", "Pricing");
        target.notify = channels;
        target
    }

    #[test]
    fn channel_kind_parses_case_insensitively() {
        assert_eq!("Telegram".parse::<ChannelKind>(), Ok(ChannelKind::Telegram));
        assert_eq!("serverchan".parse::<ChannelKind>(), Ok(ChannelKind::ServerChan));
        assert!("sms".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn target_endpoint_wins_over_default() {
        let channels = NotifyChannels {
            feishu: Some("https://open.feishu.cn/target".into()),
            ..Default::default()
        };
        let defaults = NotifierDefaults {
            feishu_webhook: Some("https://open.feishu.cn/default".into()),
            wecom_webhook: Some("https://qyapi.weixin.qq.com/default".into()),
            serverchan_key: None,
        };

        let deliveries = resolve_deliveries(&channels, &defaults);
        assert_eq!(
            deliveries,
            vec![
                Delivery::Feishu {
                    webhook: "https://open.feishu.cn/target".into()
                },
                Delivery::WeCom {
                    webhook: "https://qyapi.weixin.qq.com/default".into()
                },
            ]
        );
    }

    #[test]
    fn no_channels_resolves_nothing() {
        let deliveries = resolve_deliveries(&NotifyChannels::default(), &NotifierDefaults::default());
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let sender = MockChannelSender::new();
        sender.fail(ChannelKind::Telegram, "HTTP 400");
        let dispatcher = NotificationDispatcher::new(sender.clone(), NotifierDefaults::default());

        let target = target_with(NotifyChannels {
            webhook: Some("https://hooks.example.com/x".into()),
            telegram: Some("42".into()),
            ..Default::default()
        });
        let change = sample_change(target.id);

        let report = dispatcher.send_all(&target, &change, None).await;
        assert_eq!(report.sent, vec![ChannelKind::Webhook]);
        assert_eq!(report.failed, vec![ChannelKind::Telegram]);
        assert_eq!(sender.attempts().len(), 2);
    }

    #[tokio::test]
    async fn slow_channel_times_out() {
        let sender = MockChannelSender::new().with_delay(Duration::from_millis(200));
        let dispatcher = NotificationDispatcher::new(sender, NotifierDefaults::default())
            .with_timeout(Duration::from_millis(20));

        let target = target_with(NotifyChannels {
            discord: Some("https://discord.com/api/webhooks/1/abc".into()),
            ..Default::default()
        });
        let report = dispatcher
            .send_all(&target, &sample_change(target.id), None)
            .await;
        assert!(report.sent.is_empty());
        assert_eq!(report.failed, vec![ChannelKind::Discord]);
    }

    #[tokio::test]
    async fn email_body_is_passed_through() {
        let sender = MockChannelSender::new();
        let dispatcher = NotificationDispatcher::new(sender.clone(), NotifierDefaults::default());
        let target = target_with(NotifyChannels {
            email: Some("ops@example.com".into()),
            ..Default::default()
        });

        dispatcher
            .send_all(&target, &sample_change(target.id), Some("<p>custom</p>"))
            .await;
        let attempts = sender.attempts();
        assert_eq!(attempts[0].1.email_body.as_deref(), Some("<p>custom</p>"));
    }

    #[tokio::test]
    async fn send_test_requires_configured_channel() {
        let dispatcher = NotificationDispatcher::new(MockChannelSender::new(), NotifierDefaults::default());
        let target = target_with(NotifyChannels::default());

        let err = dispatcher
            .send_test(ChannelKind::Telegram, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn status_reports_global_channels() {
        let sender = MockChannelSender::new().with_credentials(&[ChannelKind::Telegram]);
        let dispatcher = NotificationDispatcher::new(
            sender,
            NotifierDefaults {
                serverchan_key: Some("SCT123".into()),
                ..Default::default()
            },
        );

        let status = dispatcher.status();
        assert_eq!(status.len(), 5);
        let configured: Vec<ChannelKind> = status
            .iter()
            .filter(|s| s.configured)
            .map(|s| s.channel)
            .collect();
        assert_eq!(configured, vec![ChannelKind::ServerChan, ChannelKind::Telegram]);
    }
}
