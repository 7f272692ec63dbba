use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    models::{Message, MessageStatus, NewMessage},
    repositories::{DispatchReceiptRepository, MessageRepository},
};

#[derive(Default)]
pub struct InMemoryMessageRepository {
    // insertion order doubles as creation order
    messages: Arc<RwLock<Vec<Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a message as-is, bypassing id and timestamp assignment.
    pub async fn insert(&self, message: Message) {
        self.messages.write().await.push(message);
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: &NewMessage) -> anyhow::Result<Message> {
        let now = Utc::now();
        let record = Message {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            content: message.content.clone(),
            phone: message.phone.clone(),
            status: message.status,
        };
        self.messages.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_all_by_status(&self, status: MessageStatus) -> anyhow::Result<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut found: Vec<Message> = messages
            .iter()
            .rev()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| &m.id == id).cloned())
    }

    async fn update_all_statuses_by_status(
        &self,
        from: MessageStatus,
        to: MessageStatus,
    ) -> anyhow::Result<u64> {
        let mut messages = self.messages.write().await;
        let now = Utc::now();
        let mut updated = 0;
        for message in messages.iter_mut().filter(|m| m.status == from) {
            message.status = to;
            message.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }
}

#[derive(Default)]
pub struct InMemoryDispatchReceiptRepository {
    receipts: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryDispatchReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, provider_message_id: &str) -> Option<String> {
        self.receipts.read().await.get(provider_message_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.receipts.read().await.len()
    }
}

#[async_trait]
impl DispatchReceiptRepository for InMemoryDispatchReceiptRepository {
    async fn put(&self, provider_message_id: &str, dispatched_at: &str) -> anyhow::Result<()> {
        self.receipts
            .write()
            .await
            .insert(provider_message_id.to_string(), dispatched_at.to_string());
        Ok(())
    }
}
