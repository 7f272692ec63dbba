use std::fmt;

use chrono::{DateTime, Utc};
use phonenumber::country;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::ValidationError;

pub const MIN_CONTENT_LENGTH: usize = 10;
pub const MAX_CONTENT_LENGTH: usize = 255;
pub const DEFAULT_PHONE_REGION: country::Id = country::Id::TR;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(MessageStatus::Pending),
            "SENT" => Some(MessageStatus::Sent),
            _ => None,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted message. Identifier and timestamps are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub content: String,
    pub phone: String,
    pub status: MessageStatus,
}

/// A message that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub phone: String,
    pub status: MessageStatus,
}

impl NewMessage {
    pub fn pending(content: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            phone: phone.into(),
            status: MessageStatus::Pending,
        }
    }

    pub fn validate_for_create(&self) -> Result<(), ValidationError> {
        if self.content.is_empty() {
            return Err(ValidationError::new("message content must be provided"));
        }

        let length = self.content.chars().count();
        if length < MIN_CONTENT_LENGTH {
            return Err(ValidationError::new(format!(
                "message content must be at least {MIN_CONTENT_LENGTH} characters long"
            )));
        }
        if length > MAX_CONTENT_LENGTH {
            return Err(ValidationError::new(format!(
                "message content must not exceed {MAX_CONTENT_LENGTH} characters"
            )));
        }

        if self.content.trim() != self.content {
            return Err(ValidationError::new(
                "message content must not contain leading or trailing whitespace",
            ));
        }

        if self.phone.is_empty() {
            return Err(ValidationError::new("message phone must be provided"));
        }

        if self.phone.trim() != self.phone {
            return Err(ValidationError::new(
                "message phone must not contain leading or trailing whitespace",
            ));
        }

        if phonenumber::parse(Some(DEFAULT_PHONE_REGION), &self.phone).is_err() {
            return Err(ValidationError::new("message phone must be a valid phone number"));
        }

        if self.status != MessageStatus::Pending {
            return Err(ValidationError::new("message status must be pending"));
        }

        Ok(())
    }
}

/// Raw status filter as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    pub status: String,
}

impl MessageFilter {
    pub fn by_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }

    pub fn validate(&self) -> Result<MessageStatus, ValidationError> {
        if self.status.is_empty() {
            return Err(ValidationError::new("message status must be provided"));
        }

        MessageStatus::from_str(&self.status)
            .ok_or_else(|| ValidationError::new("message status must be one of PENDING or SENT"))
    }
}

pub fn validate_message_id(id: &str) -> Result<Uuid, ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new("message id must be provided"));
    }

    Uuid::parse_str(id)
        .map_err(|err| ValidationError::new(format!("message id must be a valid uuid: {err}")))
}

/// Status a stored message must hold before `sent` may dispatch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SentEligibility {
    /// The bulk processor already flipped the row; dispatch follows the flip.
    #[default]
    AlreadySent,
    /// Dispatch happens before any status flip.
    Pending,
}

impl SentEligibility {
    pub fn required_status(&self) -> MessageStatus {
        match self {
            SentEligibility::AlreadySent => MessageStatus::Sent,
            SentEligibility::Pending => MessageStatus::Pending,
        }
    }

    pub fn from_status(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Sent => SentEligibility::AlreadySent,
            MessageStatus::Pending => SentEligibility::Pending,
        }
    }
}
