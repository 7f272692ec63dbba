use serde::Deserialize;

use crate::domain::models::MessageStatus;

/// A raw change notification as delivered by the CDC transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl ChangeEvent {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeKey {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    pub before: Option<RowImage>,
    pub after: Option<RowImage>,
}

/// The only column of a row image this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct RowImage {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub before: MessageStatus,
    pub after: MessageStatus,
}

impl StatusChange {
    pub fn is_dispatch_trigger(&self) -> bool {
        self.before == MessageStatus::Pending && self.after == MessageStatus::Sent
    }
}
