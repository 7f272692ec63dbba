use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};

use crate::domain::repositories::DispatchReceiptRepository;

pub struct RedisDispatchReceiptRepository {
    connection: MultiplexedConnection,
}

impl RedisDispatchReceiptRepository {
    pub async fn connect(url: &str) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .context("failed to connect to redis")?;
        Ok(Arc::new(Self { connection }))
    }
}

#[async_trait]
impl DispatchReceiptRepository for RedisDispatchReceiptRepository {
    async fn put(&self, provider_message_id: &str, dispatched_at: &str) -> anyhow::Result<()> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(receipt_key(provider_message_id), dispatched_at)
            .await?;
        Ok(())
    }
}

fn receipt_key(provider_message_id: &str) -> String {
    format!("message:{provider_message_id}")
}
