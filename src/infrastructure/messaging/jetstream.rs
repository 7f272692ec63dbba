use std::sync::Arc;

use anyhow::Context;
use async_nats::HeaderMap;
use async_nats::jetstream::{
    self,
    consumer::{AckPolicy, DeliverPolicy, pull},
};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{application::services::change_feed::ChangeFeed, domain::events::ChangeEvent};

#[derive(Clone)]
pub struct JetstreamConfig {
    pub url: String,
    pub stream: String,
    pub subject: String,
    pub durable: String,
    /// Header carrying the JSON key of the changed row.
    pub key_header: String,
}

/// CDC events read from a durable pull consumer.
///
/// Messages are acked as soon as they are read, so each event is handled at
/// most once and a restart resumes after the last acked one.
pub struct JetstreamChangeFeed {
    messages: Mutex<pull::Stream>,
    key_header: String,
    closed: CancellationToken,
}

impl JetstreamChangeFeed {
    pub async fn connect(config: &JetstreamConfig) -> anyhow::Result<Arc<Self>> {
        let client = async_nats::connect(&config.url)
            .await
            .context("failed to connect to nats")?;
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream.clone(),
                subjects: vec![config.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow::anyhow!("failed to get stream {}: {}", config.stream, e))?;

        let consumer = stream
            .get_or_create_consumer(
                &config.durable,
                pull::Config {
                    durable_name: Some(config.durable.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy: DeliverPolicy::New,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| anyhow::anyhow!("failed to get consumer {}: {}", config.durable, e))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| anyhow::anyhow!("failed to open message stream: {}", e))?;

        Ok(Arc::new(Self {
            messages: Mutex::new(messages),
            key_header: config.key_header.clone(),
            closed: CancellationToken::new(),
        }))
    }

    async fn accept(&self, message: jetstream::Message) -> anyhow::Result<ChangeEvent> {
        if let Err(e) = message.ack().await {
            return Err(anyhow::anyhow!("failed to ack message: {}", e));
        }
        Ok(change_event(
            message.headers.as_ref(),
            &self.key_header,
            &message.payload,
        ))
    }
}

#[async_trait]
impl ChangeFeed for JetstreamChangeFeed {
    async fn next(&self) -> Option<anyhow::Result<ChangeEvent>> {
        let mut messages = tokio::select! {
            _ = self.closed.cancelled() => return None,
            messages = self.messages.lock() => messages,
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            next = messages.next() => match next {
                None => None,
                Some(Err(err)) => Some(Err(anyhow::Error::new(err).context("jetstream pull"))),
                Some(Ok(message)) => Some(self.accept(message).await),
            },
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

fn change_event(headers: Option<&HeaderMap>, key_header: &str, payload: &[u8]) -> ChangeEvent {
    let key = headers
        .and_then(|headers| headers.get(key_header))
        .map(|value| value.as_str().as_bytes().to_vec())
        .unwrap_or_default();
    ChangeEvent::new(key, payload)
}
