// SMTP notification for new contact messages

use super::Notifier;
use crate::config::EmailConfig;
use crate::portfolio::contact::ContactForm;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// Returns `None` when the relay host or the recipient is not configured.
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>> {
        let (Some(host), Some(to)) = (config.smtp_host.as_deref(), config.to.as_deref()) else {
            return Ok(None);
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("Invalid SMTP relay {host}"))?;
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = config
            .from
            .as_deref()
            .or(config.smtp_username.as_deref())
            .unwrap_or(to);

        Ok(Some(Self {
            mailer: builder.build(),
            from: from.parse().context("Failed to parse from address")?,
            to: to.parse().context("Failed to parse recipient address")?,
        }))
    }

    pub fn build_message(&self, form: &ContactForm) -> Result<Message> {
        let reply_to: Mailbox = format!("{} <{}>", form.name, form.email)
            .parse()
            .context("Failed to parse sender address")?;

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .reply_to(reply_to)
            .subject(format!("Portfolio Contact: {}", form.subject))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body(form)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body(form)),
                    ),
            )
            .context("Failed to build email message")
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn contact_received(&self, form: &ContactForm) -> Result<()> {
        let message = self.build_message(form)?;
        self.mailer
            .send(message)
            .await
            .context("SMTP send failed")?;
        info!(to = %self.to, subject = %form.subject, "Contact notification sent");
        Ok(())
    }
}

fn text_body(form: &ContactForm) -> String {
    format!(
        "New contact form submission\n\nFrom: {}\nEmail: {}\nSubject: {}\n\n{}\n\nSent at: {}\n",
        form.name,
        form.email,
        form.subject,
        form.message,
        Utc::now().format("%B %d, %Y at %I:%M %p UTC"),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn html_body(form: &ContactForm) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
<h2>New Contact Form Submission</h2>
<p><strong>From:</strong> {}</p>
<p><strong>Email:</strong> {}</p>
<p><strong>Subject:</strong> {}</p>
<div style="background-color: #f5f5f5; padding: 20px; border-radius: 5px;">
<p style="white-space: pre-wrap;">{}</p>
</div>
</div>"#,
        escape_html(&form.name),
        escape_html(&form.email),
        escape_html(&form.subject),
        escape_html(&form.message),
    )
}
