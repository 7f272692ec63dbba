use std::sync::Arc;

use poem_openapi::{OpenApi, payload::Json};

use crate::presentation::http::{
    endpoints::root::{ApiState, EndpointsTags},
    responses::{StartJobResponseDto, StopJobResponseDto},
};

#[derive(Clone)]
pub struct JobsEndpoints {
    state: Arc<ApiState>,
}

impl JobsEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl JobsEndpoints {
    /// Starts the periodic processor; `started` is false when it was already running
    #[oai(path = "/messages/jobs", method = "post", tag = EndpointsTags::Jobs)]
    pub async fn start_job(&self) -> Json<StartJobResponseDto> {
        Json(StartJobResponseDto {
            started: self.state.processor.start(),
        })
    }

    /// Stops the periodic processor after its current tick
    #[oai(path = "/messages/jobs", method = "delete", tag = EndpointsTags::Jobs)]
    pub async fn stop_job(&self) -> Json<StopJobResponseDto> {
        Json(StopJobResponseDto {
            stopped: self.state.processor.stop().await,
        })
    }
}
