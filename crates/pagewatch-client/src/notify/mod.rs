//! HTTP and SMTP delivery for the core notification dispatcher.

mod email;
pub mod payload;

use std::sync::Arc;

use pagewatch_core::error::AppError;
use pagewatch_core::notify::{
    CHANNEL_TIMEOUT, ChangeNotice, ChannelKind, ChannelSender, Delivery, NotificationDispatcher,
    NotifierDefaults,
};
use reqwest::Client;
use serde_json::Value;

pub use email::SmtpMailer;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SERVERCHAN_API_BASE: &str = "https://sctapi.ftqq.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Process-wide notification credentials and default endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub smtp: Option<SmtpConfig>,
    pub telegram_bot_token: Option<String>,
    pub feishu_webhook: Option<String>,
    pub wecom_webhook: Option<String>,
    pub serverchan_key: Option<String>,
    pub telegram_api_base: String,
    pub serverchan_api_base: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            smtp: None,
            telegram_bot_token: None,
            feishu_webhook: None,
            wecom_webhook: None,
            serverchan_key: None,
            telegram_api_base: TELEGRAM_API_BASE.to_string(),
            serverchan_api_base: SERVERCHAN_API_BASE.to_string(),
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NotifierConfig {
    /// Reads `SMTP_*`, `TELEGRAM_BOT_TOKEN`, `FEISHU_WEBHOOK_URL`,
    /// `WECOM_WEBHOOK_URL` and `SERVERCHAN_KEY`.
    pub fn from_env() -> Result<Self, AppError> {
        let smtp = match env_opt("SMTP_HOST") {
            Some(host) => {
                let port = match env_opt("SMTP_PORT") {
                    Some(port) => port
                        .parse::<u16>()
                        .map_err(|e| AppError::ConfigError(format!("SMTP_PORT must be a port number: {e}")))?,
                    None => 587,
                };
                let username = env_opt("SMTP_USER");
                let from = env_opt("SMTP_FROM")
                    .or_else(|| username.clone())
                    .ok_or_else(|| {
                        AppError::ConfigError("SMTP_FROM or SMTP_USER must be set".to_string())
                    })?;
                Some(SmtpConfig {
                    host,
                    port,
                    username,
                    password: env_opt("SMTP_PASS"),
                    from,
                })
            }
            None => None,
        };

        Ok(Self {
            smtp,
            telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
            feishu_webhook: env_opt("FEISHU_WEBHOOK_URL"),
            wecom_webhook: env_opt("WECOM_WEBHOOK_URL"),
            serverchan_key: env_opt("SERVERCHAN_KEY"),
            ..Self::default()
        })
    }

    pub fn defaults(&self) -> NotifierDefaults {
        NotifierDefaults {
            feishu_webhook: self.feishu_webhook.clone(),
            wecom_webhook: self.wecom_webhook.clone(),
            serverchan_key: self.serverchan_key.clone(),
        }
    }
}

/// [`ChannelSender`] backed by `reqwest` for chat/webhook channels and
/// `lettre` for email.
#[derive(Clone)]
pub struct HttpChannelSender {
    client: Client,
    config: Arc<NotifierConfig>,
    mailer: Option<SmtpMailer>,
}

impl HttpChannelSender {
    pub fn new(config: NotifierConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(CHANNEL_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        let mailer = config.smtp.as_ref().map(SmtpMailer::new).transpose()?;

        Ok(Self {
            client,
            config: Arc::new(config),
            mailer,
        })
    }

    async fn post_json(&self, kind: ChannelKind, url: &str, body: &Value) -> Result<(), AppError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::notification(kind.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::notification(
                kind.as_str(),
                format!("HTTP {}", status.as_u16()),
            ));
        }
        Ok(())
    }
}

impl ChannelSender for HttpChannelSender {
    async fn attempt(&self, delivery: &Delivery, notice: &ChangeNotice) -> Result<(), AppError> {
        let kind = delivery.kind();
        match delivery {
            Delivery::Email { to } => {
                let mailer = self.mailer.as_ref().ok_or_else(|| {
                    AppError::ConfigError("SMTP is not configured (set SMTP_HOST)".to_string())
                })?;
                mailer.send(to, notice).await
            }
            Delivery::Webhook { url } => self.post_json(kind, url, &payload::webhook(notice)).await,
            Delivery::Feishu { webhook } => {
                self.post_json(kind, webhook, &payload::feishu(notice)).await
            }
            Delivery::ServerChan { send_key } => {
                let url = format!(
                    "{}/{send_key}.send",
                    self.config.serverchan_api_base.trim_end_matches('/')
                );
                self.post_json(kind, &url, &payload::serverchan(notice)).await
            }
            Delivery::WeCom { webhook } => self.post_json(kind, webhook, &payload::wecom(notice)).await,
            Delivery::Telegram { chat_id } => {
                let token = self.config.telegram_bot_token.as_ref().ok_or_else(|| {
                    AppError::ConfigError(
                        "Telegram is not configured (set TELEGRAM_BOT_TOKEN)".to_string(),
                    )
                })?;
                let url = format!(
                    "{}/bot{token}/sendMessage",
                    self.config.telegram_api_base.trim_end_matches('/')
                );
                self.post_json(kind, &url, &payload::telegram(chat_id, notice))
                    .await
            }
            Delivery::Discord { webhook } => {
                self.post_json(kind, webhook, &payload::discord(notice)).await
            }
        }
    }

    fn has_credentials(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Email => self.mailer.is_some(),
            ChannelKind::Telegram => self.config.telegram_bot_token.is_some(),
            _ => false,
        }
    }
}

/// Dispatcher wired to real channels from `config`.
pub fn build_dispatcher(
    config: NotifierConfig,
) -> Result<NotificationDispatcher<HttpChannelSender>, AppError> {
    let defaults = config.defaults();
    let sender = HttpChannelSender::new(config)?;
    Ok(NotificationDispatcher::new(sender, defaults))
}
