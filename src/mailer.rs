use async_trait::async_trait;
use chrono::{DateTime, Local};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Settings;
use crate::AppResult;

/// Outbound mail for cycle reports.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> AppResult<()>;
}

/// `<prefix>: <local timestamp>`.
pub fn subject_line(prefix: &str, now: DateTime<Local>) -> String {
    format!("{prefix}: {}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Plain SMTP relay without TLS or authentication, as used on the
/// converter's internal network.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, from: Mailbox, to: Mailbox) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();
        Self {
            transport,
            from,
            to,
        }
    }

    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Ok(Self::new(
            &settings.email_host,
            settings.email_port,
            settings.from_mailbox()?,
            settings.to_mailbox()?,
        ))
    }

    fn message(&self, subject: &str, body: &str) -> AppResult<Message> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> AppResult<()> {
        let message = self.message(subject, body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn subject_carries_prefix_and_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            subject_line("PDF Neevia Converter Error", now),
            "PDF Neevia Converter Error: 2024-03-09 14:05:07"
        );
    }

    #[test]
    fn message_is_plain_text_between_configured_mailboxes() {
        let mailer = SmtpMailer::new(
            "localhost",
            2525,
            "converter@example.org".parse().unwrap(),
            "ops@example.org".parse().unwrap(),
        );
        let message = mailer.message("subject", "0) /errors/1.pdf\r\n").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: converter@example.org"), "{raw}");
        assert!(raw.contains("To: ops@example.org"), "{raw}");
        assert!(raw.contains("Content-Type: text/plain"), "{raw}");
        assert!(raw.contains("0) /errors/1.pdf"), "{raw}");
    }
}
