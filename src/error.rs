//! Error kinds surfaced by the persistence and synchronization core.
//!
//! Every variant maps to a stable machine-readable code and an HTTP-style
//! status so a request boundary can tell bad input apart from an
//! unreachable source or a missing record.
//!
//! | Kind | Code | Status |
//! |------|------|--------|
//! | [`Validation`](ContentError::Validation) | `validation` | 400 |
//! | [`Configuration`](ContentError::Configuration) | `configuration` | 500 |
//! | [`NotFound`](ContentError::NotFound) | `not_found` | 404 |
//! | [`Conflict`](ContentError::Conflict) | `conflict` | 409 |
//! | [`Retrieval`](ContentError::Retrieval) | `retrieval` | 502 |
//! | [`Persistence`](ContentError::Persistence) | `persistence` | 500 |
//! | [`UnsupportedSource`](ContentError::UnsupportedSource) | `unsupported_source` | 501 |
//! | [`Cancelled`](ContentError::Cancelled) | `cancelled` | 408 |

use thiserror::Error;

/// Result alias used by every core operation.
pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Debug, Error)]
pub enum ContentError {
    /// Malformed or disallowed input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Required external configuration is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Namespace + slug collision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An external fetch failed at the transport, status or parsing level.
    #[error("retrieval failed: {message}")]
    Retrieval {
        message: String,
        status: Option<u16>,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[source] sqlx::Error),

    #[error("unsupported source type: {0}")]
    UnsupportedSource(String),

    /// The caller's cancellation token fired before an external call finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl ContentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ContentError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        ContentError::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ContentError::NotFound(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        ContentError::Retrieval {
            message: msg.into(),
            status: None,
        }
    }

    pub fn retrieval_status(msg: impl Into<String>, status: u16) -> Self {
        ContentError::Retrieval {
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ContentError::Validation(_) => "validation",
            ContentError::Configuration(_) => "configuration",
            ContentError::NotFound(_) => "not_found",
            ContentError::Conflict(_) => "conflict",
            ContentError::Retrieval { .. } => "retrieval",
            ContentError::Persistence(_) => "persistence",
            ContentError::UnsupportedSource(_) => "unsupported_source",
            ContentError::Cancelled => "cancelled",
        }
    }

    /// Outward status a request boundary should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ContentError::Validation(_) => 400,
            ContentError::Configuration(_) => 500,
            ContentError::NotFound(_) => 404,
            ContentError::Conflict(_) => 409,
            ContentError::Retrieval { .. } => 502,
            ContentError::Persistence(_) => 500,
            ContentError::UnsupportedSource(_) => 501,
            ContentError::Cancelled => 408,
        }
    }
}

impl From<sqlx::Error> for ContentError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return ContentError::Conflict(db_err.message().to_string());
            }
        }
        ContentError::Persistence(err)
    }
}
