use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use formstack_core::{CoreError, ValidationErrors, ids::*};
use formstack_storage::StorageError;

use crate::content::ContentError;

/// The entity an ownership or lookup failure is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Form(FormId),
    /// A form id that could not even be parsed.
    FormRef(String),
    Field(FieldId),
    Choice(ChoiceId),
    Response(ResponseId),
}

impl Subject {
    /// Message shown to callers. Identical for not-found and unauthorized.
    pub fn public_message(&self) -> &'static str {
        match self {
            Subject::Form(_) | Subject::FormRef(_) => "Form not found",
            Subject::Field(_) => "Form field does not exist",
            Subject::Choice(_) => "Choice does not exist",
            Subject::Response(_) => "Response not found",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Form(id) => write!(f, "form {id}"),
            Subject::FormRef(raw) => write!(f, "form {raw:?}"),
            Subject::Field(id) => write!(f, "field {id}"),
            Subject::Choice(id) => write!(f, "choice {id}"),
            Subject::Response(id) => write!(f, "response {id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Subject),

    #[error("unauthorized: {0}")]
    Unauthorized(Subject),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("content store error: {0}")]
    Content(#[from] ContentError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("config error: {0}")]
    Config(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Consistency(msg) => EngineError::Consistency(msg),
            other => EngineError::Storage(other),
        }
    }
}

/// What a caller gets to see of an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublicError {
    NotFound { message: String },
    ValidationFailed { errors: BTreeMap<String, Vec<String>> },
    BadRequest { message: String },
    Failure { message: String },
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }

    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            EngineError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Collapse into the caller-facing form. Unauthorized reads exactly like
    /// not-found; storage, consistency and content failures are generic.
    pub fn public(&self) -> PublicError {
        match self {
            EngineError::NotFound(subject) | EngineError::Unauthorized(subject) => {
                PublicError::NotFound {
                    message: subject.public_message().to_string(),
                }
            }
            EngineError::Validation(errors) => PublicError::ValidationFailed {
                errors: errors.by_field(),
            },
            EngineError::Core(err) => PublicError::BadRequest {
                message: err.to_string(),
            },
            EngineError::Consistency(_)
            | EngineError::Storage(_)
            | EngineError::Content(_)
            | EngineError::Config(_) => {
                error!(error = %self, "request failed");
                PublicError::Failure {
                    message: "Something went wrong".to_string(),
                }
            }
        }
    }
}
