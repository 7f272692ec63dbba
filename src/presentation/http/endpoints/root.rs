use std::sync::Arc;

use poem::Route;
use poem_openapi::{OpenApiService, Tags};

use crate::{
    application::{
        handlers::periodic_processor::PeriodicProcessor, services::lifecycle::MessageLifecycle,
    },
    presentation::http::endpoints::{
        health::HealthEndpoints, jobs::JobsEndpoints, messages::MessagesEndpoints,
    },
};

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Arc<dyn MessageLifecycle>,
    pub processor: Arc<PeriodicProcessor>,
}

/// Enum of API sections (tags)
#[derive(Tags)]
pub enum EndpointsTags {
    Health,
    Messages,
    Jobs,
}

/// The OpenAPI service under `/api` and its Swagger UI at `/`.
pub fn routes(state: Arc<ApiState>, server_url: &str) -> Route {
    let api_service = OpenApiService::new(
        (
            HealthEndpoints,
            MessagesEndpoints::new(state.clone()),
            JobsEndpoints::new(state),
        ),
        "Messager API",
        env!("CARGO_PKG_VERSION"),
    )
    .server(format!("{server_url}/api"));
    let ui = api_service.swagger_ui();

    Route::new().nest("/api", api_service).nest("/", ui)
}
