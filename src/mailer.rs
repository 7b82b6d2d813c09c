use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::{config::Sender, notifier::Digest};

mod sendgrid;
pub use sendgrid::SendGridMailer;

/// One templated notification for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub to: String,
    pub from: Sender,
    pub template_id: String,
    pub data: Digest,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Logs emails instead of sending them.
pub struct DryRunMailer;

#[async_trait]
impl Mailer for DryRunMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        info!(
            "dry run, not sending email to {}:\n{}",
            email.to,
            serde_json::to_string_pretty(email)?
        );
        Ok(())
    }
}
