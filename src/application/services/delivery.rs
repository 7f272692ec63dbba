use async_trait::async_trait;

/// External provider that hands a message to its recipient.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Returns the provider-assigned identifier of the dispatched message.
    async fn send(&self, content: &str, phone: &str) -> anyhow::Result<String>;
}
