use crate::{domain::models::Message, presentation::http::responses::MessageDto};

pub fn map_message(message: &Message) -> MessageDto {
    MessageDto {
        id: message.id,
        created_at: message.created_at.to_rfc3339(),
        updated_at: message.updated_at.to_rfc3339(),
        content: message.content.clone(),
        phone: message.phone.clone(),
        status: message.status.into(),
    }
}
