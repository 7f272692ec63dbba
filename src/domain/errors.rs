use std::fmt;

use thiserror::Error;

use crate::domain::models::MessageStatus;

/// A single violated rule. Validation stops at the first failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{description}")]
pub struct ValidationError {
    pub description: String,
}

impl ValidationError {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationScope {
    Create,
    ListByStatus,
    Sent,
}

impl fmt::Display for ValidationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationScope::Create => "create",
            ValidationScope::ListByStatus => "list by status",
            ValidationScope::Sent => "sent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("message is not valid for {scope}: {source}")]
    Validation {
        scope: ValidationScope,
        #[source]
        source: ValidationError,
    },
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("message {id} is {actual}, sent requires {required}")]
    NotEligible {
        id: String,
        actual: MessageStatus,
        required: MessageStatus,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DomainError {
    pub fn validation(scope: ValidationScope, source: ValidationError) -> Self {
        DomainError::Validation { scope, source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DomainError::Validation { .. })
    }
}
