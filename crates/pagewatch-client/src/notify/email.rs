use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pagewatch_core::error::AppError;
use pagewatch_core::notify::ChangeNotice;

use super::SmtpConfig;
use super::payload;

const CHANNEL: &str = "email";

/// SMTP transport built once from [`SmtpConfig`].
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Port 465 uses implicit TLS; anything else negotiates STARTTLS.
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| AppError::ConfigError(format!("Invalid SMTP host {}: {e}", config.host)))?;

        let mut builder = builder.port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::ConfigError(format!("Invalid SMTP_FROM address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Send the notice to one or more comma-separated recipients.
    pub async fn send(&self, to: &str, notice: &ChangeNotice) -> Result<(), AppError> {
        let html = notice
            .email_body
            .clone()
            .unwrap_or_else(|| payload::email_html(notice));
        let text = payload::html_to_text(&html);

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(payload::email_subject(notice));
        for recipient in to.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            let mailbox = recipient.parse::<Mailbox>().map_err(|e| {
                AppError::notification(CHANNEL, format!("Invalid recipient {recipient}: {e}"))
            })?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|e| AppError::notification(CHANNEL, format!("Failed to build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::notification(CHANNEL, e.to_string()))?;

        tracing::debug!(%to, target_id = %notice.target_id, "Email delivered");
        Ok(())
    }
}
