pub mod delivery;
pub mod followup;
pub mod templates;

use async_trait::async_trait;

use crate::models::Message;

/// Hands a rendered message to an email or SMS carrier.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &Message) -> anyhow::Result<()>;
}

/// Sender that only records messages in the log. Used until a carrier is
/// wired in.
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        anyhow::ensure!(
            message.to.is_some() || message.phone.is_some(),
            "message for client {} has no email or phone",
            message.client_id
        );
        tracing::info!(
            client_id = %message.client_id,
            message_type = %message.message_type,
            to = ?message.to,
            phone = ?message.phone,
            subject = %message.subject,
            "sending message"
        );
        Ok(())
    }
}
