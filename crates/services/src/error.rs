//! Shared error types for the services crate.

use reqwest::StatusCode;
use thiserror::Error;

use storage::repository::StorageError;
use survey_core::model::{AnswerError, DefinitionError, QuestionId, SurveyId};

/// Errors emitted by `SurveySession` and `SurveySessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("survey {0} not found")]
    SurveyNotFound(SurveyId),
    #[error("question {0} is not part of this survey")]
    UnknownQuestion(QuestionId),
    #[error("submission is only available from the last question")]
    SubmitNotAllowed,
    #[error("session already completed")]
    Completed,
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `HttpRemote`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error("base url {0} cannot carry path segments")]
    CannotBeABase(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<RemoteError> for StorageError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::HttpStatus(StatusCode::NOT_FOUND) => StorageError::NotFound,
            RemoteError::HttpStatus(StatusCode::CONFLICT) => StorageError::Conflict,
            RemoteError::Http(e) if e.is_decode() => StorageError::Serialization(e.to_string()),
            other => StorageError::Connection(other.to_string()),
        }
    }
}

/// Errors emitted while reading configuration from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} is not a valid url: {source}")]
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
    #[error("{var} expects a whole number of milliseconds, got {raw:?}")]
    InvalidNumber { var: &'static str, raw: String },
    #[error("{var} expects true or false, got {raw:?}")]
    InvalidFlag { var: &'static str, raw: String },
}
