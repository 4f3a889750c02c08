// Contact form intake

use crate::db::{Record, RecordStore, Table};
use crate::notify::Notifier;
use crate::types::{AppError, AppResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactForm {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "a valid e-mail address is required"), length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000, message = "message is required"))]
    pub message: String,
}

impl ContactForm {
    fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            subject: self.subject.trim().to_string(),
            message: self.message.trim().to_string(),
        }
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.set("name", self.name.clone());
        record.set("email", self.email.clone());
        record.set("subject", self.subject.clone());
        record.set("message", self.message.clone());
        record.set("read", false);
        record
    }
}

pub struct ContactService {
    records: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
}

impl ContactService {
    pub fn new(records: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { records, notifier }
    }

    /// Validate and store a message, then notify the owner.
    ///
    /// The notification is best effort: a stored message is never lost
    /// because the mail relay is down.
    pub async fn submit(&self, form: ContactForm) -> AppResult<Record> {
        let form = form.trimmed();
        form.validate()
            .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

        let stored = self.records.insert(Table::ContactMessages, form.to_record()).await?;
        info!(id = ?stored.id(), subject = %form.subject, "Contact message stored");

        if let Err(e) = self.notifier.contact_received(&form).await {
            warn!(error = %e, "Contact notification failed");
        }
        Ok(stored)
    }
}
