// Notifications sent when visitors reach out

pub mod email;

pub use email::EmailNotifier;

use crate::portfolio::contact::ContactForm;
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn contact_received(&self, form: &ContactForm) -> anyhow::Result<()>;
}

/// Used when no SMTP relay is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn contact_received(&self, form: &ContactForm) -> anyhow::Result<()> {
        tracing::debug!(subject = %form.subject, "E-mail notifications disabled, skipping");
        Ok(())
    }
}
