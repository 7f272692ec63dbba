use poem_openapi::{ApiResponse, Object, payload::Json};
use uuid::Uuid;

use crate::presentation::models::MessageStatusDto;

#[derive(Object)]
pub struct CreateMessageResponseDto {
    pub id: Uuid,
}

#[derive(ApiResponse)]
pub enum CreateMessageResponse {
    #[oai(status = 201)]
    Created(Json<CreateMessageResponseDto>),
}

#[derive(Object)]
#[oai(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub created_at: String,
    pub updated_at: String,
    pub content: String,
    pub phone: String,
    pub status: MessageStatusDto,
}

#[derive(Object)]
pub struct ListMessagesResponseDto {
    pub items: Vec<MessageDto>,
}

#[derive(Object)]
pub struct StartJobResponseDto {
    pub started: bool,
}

#[derive(Object)]
pub struct StopJobResponseDto {
    pub stopped: bool,
}
