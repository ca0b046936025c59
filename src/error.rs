//! Handler failures and how the dispatcher classifies them.
//!
//! Handlers return [`Error`]; the error chain sees it by reference and the default
//! error handler maps [`Error::kind`] onto a status code and a short message.
//! Nothing in here ever carries a filesystem path back to the client.

use std::io;

use thiserror::Error;

use crate::http::StatusCode;

/// A failure raised by a route handler.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing required key `{0}`")]
    MissingKey(String),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to serialize response body: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any foreign error as an unclassified failure.
    pub fn other(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(error.into())
    }

    /// Classifies the failure for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::BadRequest(_) | Self::MissingKey(_) | Self::Json(_) => ErrorKind::BadRequest,
            Self::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => ErrorKind::Forbidden,
                _ => ErrorKind::Unclassified,
            },
            Self::Serialize(_) | Self::Other(_) => ErrorKind::Unclassified,
        }
    }
}

/// Handling policy for a failure, independent of its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    BadRequest,
    Unclassified,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NotFound,
            Self::Forbidden => StatusCode::Forbidden,
            Self::BadRequest => StatusCode::BadRequest,
            Self::Unclassified => StatusCode::InternalServerError,
        }
    }

    /// Plain-text body the default error handler sends.
    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Not found.",
            Self::Forbidden => "Forbidden.",
            Self::BadRequest => "Invalid request.",
            Self::Unclassified => "Unknown error.",
        }
    }
}
