use poem_openapi::Enum;

use crate::domain::models::MessageStatus;

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageStatusDto {
    #[oai(rename = "PENDING")]
    Pending,
    #[oai(rename = "SENT")]
    Sent,
}

impl From<MessageStatus> for MessageStatusDto {
    fn from(value: MessageStatus) -> Self {
        match value {
            MessageStatus::Pending => MessageStatusDto::Pending,
            MessageStatus::Sent => MessageStatusDto::Sent,
        }
    }
}
