use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{Message, MessageStatus, NewMessage};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persists the message and returns it with store-assigned id and timestamps.
    async fn create(&self, message: &NewMessage) -> anyhow::Result<Message>;

    /// Most recently created first.
    async fn find_all_by_status(&self, status: MessageStatus) -> anyhow::Result<Vec<Message>>;

    async fn find_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Message>>;

    /// Moves every row in `from` to `to` atomically and returns the affected count.
    async fn update_all_statuses_by_status(
        &self,
        from: MessageStatus,
        to: MessageStatus,
    ) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait DispatchReceiptRepository: Send + Sync {
    async fn put(&self, provider_message_id: &str, dispatched_at: &str) -> anyhow::Result<()>;
}
