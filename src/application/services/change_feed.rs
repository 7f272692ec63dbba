use async_trait::async_trait;

use crate::domain::events::ChangeEvent;

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Next event from the stream. `None` means the stream ended or was closed.
    async fn next(&self) -> Option<anyhow::Result<ChangeEvent>>;

    /// Ends the stream. Pending and later `next` calls return `None`.
    async fn close(&self) -> anyhow::Result<()>;
}
