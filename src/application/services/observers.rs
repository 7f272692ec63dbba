use std::sync::Arc;

use thiserror::Error;

use crate::domain::{errors::DomainError, models::MessageStatus};

/// Why a change event did not lead to a successful dispatch.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("failed to read change event: {0}")]
    Read(#[source] anyhow::Error),
    #[error("change event key is malformed: {0}")]
    MalformedKey(#[source] serde_json::Error),
    #[error("change event key has no message id")]
    MissingId,
    #[error("change event value for message {id} is malformed: {source}")]
    MalformedValue {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("change event for message {id} has no {image} status")]
    MissingStatus { id: String, image: &'static str },
    #[error("change event for message {id} has unknown {image} status {value:?}")]
    UnknownStatus {
        id: String,
        image: &'static str,
        value: String,
    },
    #[error("message {id} moved {before} -> {after}, expected PENDING -> SENT")]
    UnexpectedTransition {
        id: String,
        before: MessageStatus,
        after: MessageStatus,
    },
    #[error("failed to dispatch message {id}: {source}")]
    Dispatch {
        id: String,
        #[source]
        source: DomainError,
    },
    #[error("dispatch of message {id} was cancelled")]
    Cancelled { id: String },
}

/// Non-fatal failure reported by a background loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("periodic processing failed: {0}")]
    Processor(#[source] DomainError),
    #[error("status transition failed: {0}")]
    Transitioner(#[source] TransitionError),
}

pub trait ErrorObserver: Send + Sync {
    fn observe(&self, error: &PipelineError);
}

pub struct TracingErrorObserver;

impl ErrorObserver for TracingErrorObserver {
    fn observe(&self, error: &PipelineError) {
        tracing::error!(error = %error, "pipeline error");
    }
}

/// Fan-out of reported errors to every subscribed observer.
#[derive(Clone, Default)]
pub struct ErrorObservers {
    observers: Vec<Arc<dyn ErrorObserver>>,
}

impl ErrorObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn notify(&self, error: PipelineError) {
        for observer in &self.observers {
            observer.observe(&error);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;

    #[test]
    fn notifies_every_subscriber() {
        let first = Arc::new(RecordingObserver::default());
        let second = Arc::new(RecordingObserver::default());
        let observers = ErrorObservers::new()
            .subscribe(first.clone())
            .subscribe(second.clone())
            .subscribe(Arc::new(TracingErrorObserver));

        observers.notify(PipelineError::Transitioner(TransitionError::MissingId));

        assert_eq!(
            first.errors(),
            vec!["status transition failed: change event key has no message id".to_string()]
        );
        assert_eq!(first.errors(), second.errors());
    }

    #[test]
    fn empty_fan_out_is_silent() {
        ErrorObservers::new().notify(PipelineError::Processor(DomainError::NotFound(
            "x".to_string(),
        )));
    }
}
