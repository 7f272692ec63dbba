use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use crate::{
    application::services::delivery::DeliveryGateway,
    domain::{
        errors::{DomainError, ValidationScope},
        models::{
            Message, MessageFilter, MessageStatus, NewMessage, SentEligibility,
            validate_message_id,
        },
        repositories::{DispatchReceiptRepository, MessageRepository},
    },
};

/// Operations over the PENDING -> SENT lifecycle of a message.
///
/// `process` is the only writer of the status flip in the message store.
/// `sent` dispatches an already eligible message and records a receipt, it
/// never touches the stored status.
#[async_trait]
pub trait MessageLifecycle: Send + Sync {
    async fn create(&self, message: NewMessage) -> Result<Message, DomainError>;

    async fn list_by_status(&self, status: &str) -> Result<Vec<Message>, DomainError>;

    /// Flips every PENDING message to SENT without dispatching. Returns the count.
    async fn process(&self) -> Result<u64, DomainError>;

    /// Dispatches the message and returns the provider-assigned id.
    async fn sent(&self, message_id: &str) -> Result<String, DomainError>;
}

pub struct MessageLifecycleService {
    messages: Arc<dyn MessageRepository>,
    receipts: Arc<dyn DispatchReceiptRepository>,
    gateway: Arc<dyn DeliveryGateway>,
    eligibility: SentEligibility,
}

impl MessageLifecycleService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        receipts: Arc<dyn DispatchReceiptRepository>,
        gateway: Arc<dyn DeliveryGateway>,
        eligibility: SentEligibility,
    ) -> Self {
        Self {
            messages,
            receipts,
            gateway,
            eligibility,
        }
    }
}

#[async_trait]
impl MessageLifecycle for MessageLifecycleService {
    async fn create(&self, message: NewMessage) -> Result<Message, DomainError> {
        message
            .validate_for_create()
            .map_err(|err| DomainError::validation(ValidationScope::Create, err))?;

        let created = self
            .messages
            .create(&message)
            .await
            .context("repository.create")?;

        tracing::info!(message_id = %created.id, "message created");
        Ok(created)
    }

    async fn list_by_status(&self, status: &str) -> Result<Vec<Message>, DomainError> {
        let status = MessageFilter::by_status(status)
            .validate()
            .map_err(|err| DomainError::validation(ValidationScope::ListByStatus, err))?;

        let messages = self
            .messages
            .find_all_by_status(status)
            .await
            .context("repository.find_all_by_status")?;

        Ok(messages)
    }

    async fn process(&self) -> Result<u64, DomainError> {
        let updated = self
            .messages
            .update_all_statuses_by_status(MessageStatus::Pending, MessageStatus::Sent)
            .await
            .context("repository.update_all_statuses_by_status")?;

        if updated > 0 {
            tracing::info!(updated, "pending messages marked as sent");
        }
        Ok(updated)
    }

    async fn sent(&self, message_id: &str) -> Result<String, DomainError> {
        let id = validate_message_id(message_id)
            .map_err(|err| DomainError::validation(ValidationScope::Sent, err))?;

        let message = match self.messages.find_by_id(&id).await {
            Ok(Some(message)) => message,
            Ok(None) => return Err(DomainError::NotFound(id.to_string())),
            Err(err) if is_not_found(&err) => return Err(DomainError::NotFound(id.to_string())),
            Err(err) => return Err(err.context("repository.find_by_id").into()),
        };

        let required = self.eligibility.required_status();
        if message.status != required {
            return Err(DomainError::NotEligible {
                id: id.to_string(),
                actual: message.status,
                required,
            });
        }

        let provider_id = self
            .gateway
            .send(&message.content, &message.phone)
            .await
            .context("gateway.send")?;

        let dispatched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(err) = self.receipts.put(&provider_id, &dispatched_at).await {
            // the provider already accepted the message, nothing is rolled back
            tracing::warn!(
                message_id = %id,
                provider_id = %provider_id,
                "message dispatched but receipt was not stored"
            );
            return Err(err.context("receipts.put").into());
        }

        tracing::info!(message_id = %id, provider_id = %provider_id, "message dispatched");
        Ok(provider_id)
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(cause.downcast_ref::<sqlx::Error>(), Some(sqlx::Error::RowNotFound))
            || matches!(
                cause.downcast_ref::<DomainError>(),
                Some(DomainError::NotFound(_))
            )
    })
}
