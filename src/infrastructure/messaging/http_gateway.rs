use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::application::services::delivery::DeliveryGateway;

const AUTH_HEADER: &str = "x-ins-auth-key";

#[derive(Clone)]
pub struct HttpGatewayConfig {
    pub url: String,
    pub token: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

pub struct HttpDeliveryGateway {
    http: Client,
    config: HttpGatewayConfig,
}

impl HttpDeliveryGateway {
    pub fn new(config: HttpGatewayConfig) -> anyhow::Result<Arc<Self>> {
        let http = Client::builder()
            .user_agent("messager/gateway")
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("failed to build delivery gateway client")?;
        Ok(Arc::new(Self { http, config }))
    }
}

#[async_trait]
impl DeliveryGateway for HttpDeliveryGateway {
    async fn send(&self, content: &str, phone: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .post(&self.config.url)
            .header(AUTH_HEADER, &self.config.token)
            .json(&SendRequest { to: phone, content })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            anyhow::bail!("delivery gateway returned unexpected status code {}", status.as_u16());
        }

        let payload: SendResponse = response
            .json()
            .await
            .context("failed to decode delivery gateway response")?;
        Ok(payload.message_id)
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}
