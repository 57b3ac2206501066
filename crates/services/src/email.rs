//! SMTP-based delivery for reminder emails.

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use meetsfu_config::SmtpSettings;

#[derive(Clone)]
pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Mailbox,
}

impl EmailSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let host = settings.host.as_ref().context("smtp.host is required")?;
        let username = settings
            .username
            .as_ref()
            .context("smtp.username is required")?;
        let password = settings
            .password
            .as_ref()
            .context("smtp.password is required")?;
        let from = settings.from.as_ref().context("smtp.from is required")?;

        let from_address: Mailbox = from
            .parse()
            .context("smtp.from is not a valid email address")?;

        let creds = Credentials::new(username.clone(), password.clone());

        let mailer = match settings.tls.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .context("failed to create SMTP TLS transport")?
                .port(settings.port)
                .credentials(creds)
                .build(),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(settings.port)
                .credentials(creds)
                .build(),
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("failed to create SMTP STARTTLS transport")?
                .port(settings.port)
                .credentials(creds)
                .build(),
        };

        Ok(Self {
            mailer,
            from_address,
        })
    }

    /// Sends a meeting reminder to a single participant's email address.
    pub async fn send_meeting_reminder(
        &self,
        to_email: &str,
        display_name: &str,
        meeting_title: &str,
        meeting_code: &str,
        minutes_before: u32,
    ) -> Result<()> {
        let to_mailbox: Mailbox = to_email.parse().context("invalid recipient address")?;

        let body = format!(
            "Hello {display_name},\n\
             \n\
             \"{meeting_title}\" starts in {minutes_before} minutes.\n\
             \n\
             Meeting code: {meeting_code}\n"
        );

        let email = Message::builder()
            .from(self.from_address.clone())
            .to(to_mailbox)
            .subject(format!("Reminder: {meeting_title} starts soon"))
            .body(body)
            .context("failed to build reminder email")?;

        self.mailer
            .send(email)
            .await
            .context("failed to send reminder email via SMTP")?;
        Ok(())
    }

    /// Sends a meeting invitation to an arbitrary email address.
    pub async fn send_meeting_invite(
        &self,
        to_email: &str,
        meeting_title: &str,
        meeting_code: &str,
    ) -> Result<()> {
        let to_mailbox: Mailbox = to_email.parse().context("invalid recipient address")?;

        let body = format!(
            "You've been invited to \"{meeting_title}\".\n\
             \n\
             Meeting code: {meeting_code}\n"
        );

        let email = Message::builder()
            .from(self.from_address.clone())
            .to(to_mailbox)
            .subject(format!("Invitation: {meeting_title}"))
            .body(body)
            .context("failed to build invite email")?;

        self.mailer
            .send(email)
            .await
            .context("failed to send invite email via SMTP")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: Some("localhost".into()),
            port: 1025,
            username: Some("user".into()),
            password: Some("pass".into()),
            from: Some("noreply@meetsfu.example".into()),
            tls: "none".into(),
        }
    }

    #[test]
    fn builds_sender_from_valid_settings() {
        assert!(EmailSender::new(&settings()).is_ok());
    }

    #[test]
    fn rejects_missing_host() {
        let mut s = settings();
        s.host = None;
        let err = EmailSender::new(&s).unwrap_err();
        assert!(err.to_string().contains("smtp.host"));
    }

    #[test]
    fn rejects_invalid_from_address() {
        let mut s = settings();
        s.from = Some("not-an-email".into());
        let err = EmailSender::new(&s).unwrap_err();
        assert!(err.to_string().contains("valid email"));
    }
}
