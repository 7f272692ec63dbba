use std::sync::Arc;

use poem::{Result as PoemResult, http::StatusCode};
use poem_openapi::{OpenApi, param::Query, payload::Json};

use crate::{
    domain::{errors::DomainError, models::NewMessage},
    presentation::http::{
        endpoints::root::{ApiState, EndpointsTags},
        mappers::map_message,
        requests::CreateMessageRequestDto,
        responses::{CreateMessageResponse, CreateMessageResponseDto, ListMessagesResponseDto},
    },
};

#[derive(Clone)]
pub struct MessagesEndpoints {
    state: Arc<ApiState>,
}

impl MessagesEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl MessagesEndpoints {
    /// Creates a PENDING message
    #[oai(path = "/messages", method = "post", tag = EndpointsTags::Messages)]
    pub async fn create_message(
        &self,
        request: Json<CreateMessageRequestDto>,
    ) -> PoemResult<CreateMessageResponse> {
        let request = request.0;
        let message = self
            .state
            .lifecycle
            .create(NewMessage::pending(request.content, request.phone))
            .await
            .map_err(domain_error)?;

        Ok(CreateMessageResponse::Created(Json(CreateMessageResponseDto {
            id: message.id,
        })))
    }

    /// Lists messages with the given status, newest first
    #[oai(path = "/messages", method = "get", tag = EndpointsTags::Messages)]
    pub async fn list_messages(
        &self,
        status: Query<Option<String>>,
    ) -> PoemResult<Json<ListMessagesResponseDto>> {
        let status = status.0.unwrap_or_default();
        let messages = self
            .state
            .lifecycle
            .list_by_status(&status)
            .await
            .map_err(domain_error)?;

        Ok(Json(ListMessagesResponseDto {
            items: messages.iter().map(map_message).collect(),
        }))
    }
}

pub(crate) fn domain_error(err: DomainError) -> poem::Error {
    let status = match &err {
        DomainError::Validation { .. } => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::NotEligible { .. } => StatusCode::CONFLICT,
        DomainError::Other(_) => {
            tracing::error!(error = %format!("{err:#}"), "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    poem::Error::from_string(err.to_string(), status)
}
