//! Error taxonomy shared by the backend and the notification sender
//!
//! Failures never cross an HTTP boundary as raw errors: each variant maps
//! onto a status code and a stable machine-readable kind, and the axum
//! integration renders that mapping for the client while the full error
//! goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Caller could not be identified (missing/bad/expired token)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Caller is known but the role does not allow the operation
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Request is malformed or violates a precondition; no state changed
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Addressable resource does not exist
    #[error("{0} not found")]
    Missing(String),

    /// Uniqueness or state conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// An upstream dependency answered with an error
    #[error("{service} upstream failure: {detail}")]
    Upstream { service: String, detail: String },

    /// An upstream dependency could not be reached at all
    #[error("{0} is unreachable")]
    Unavailable(String),

    /// Deadline hit on an outbound call
    #[error("timed out waiting for {0}")]
    TimedOut(String),

    /// Input was well-formed but could not be processed
    #[error("could not process: {0}")]
    Rejected(String),

    /// Broken deployment configuration
    #[error("bad configuration: {0}")]
    Config(String),

    /// Everything the service cannot explain to the caller
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Id(#[from] uuid::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

macro_rules! message_ctor {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $name(message: impl Into<String>) -> Self {
                AppError::$variant(message.into())
            }
        )*
    };
}

impl AppError {
    message_ctor! {
        authentication => Auth,
        authorization => Forbidden,
        validation => Invalid,
        bad_request => Invalid,
        not_found => Missing,
        conflict => Conflict,
        service_unavailable => Unavailable,
        timeout => TimedOut,
        processing => Rejected,
        configuration => Config,
        internal => Internal,
    }

    pub fn external_service(service: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Upstream {
            service: service.into(),
            detail: detail.into(),
        }
    }

    /// Machine-readable kind and the HTTP status it renders as.
    pub fn kind(&self) -> (&'static str, StatusCode) {
        use AppError::*;

        match self {
            Auth(_) | Token(_) => ("unauthorized", StatusCode::UNAUTHORIZED),
            Forbidden(_) => ("forbidden", StatusCode::FORBIDDEN),
            Invalid(_) | Id(_) => ("invalid", StatusCode::BAD_REQUEST),
            Missing(_) => ("not_found", StatusCode::NOT_FOUND),
            Conflict(_) => ("conflict", StatusCode::CONFLICT),
            Upstream { .. } | Http(_) => ("upstream", StatusCode::BAD_GATEWAY),
            Unavailable(_) => ("unavailable", StatusCode::SERVICE_UNAVAILABLE),
            TimedOut(_) => ("timeout", StatusCode::REQUEST_TIMEOUT),
            Rejected(_) => ("unprocessable", StatusCode::UNPROCESSABLE_ENTITY),
            Config(_) | Internal(_) | Db(_) | Json(_) | Io(_) | Other(_) => {
                ("internal", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// True for uniqueness violations surfaced by Postgres (23505).
    pub fn is_unique_violation(&self) -> bool {
        use sqlx::error::DatabaseError as _;

        match self {
            AppError::Db(sqlx::Error::Database(db)) => {
                db.code().map(|c| c == "23505").unwrap_or(false)
            }
            AppError::Conflict(_) => true,
            _ => false,
        }
    }
}

/// Body every handler error renders as
#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    detail: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (kind, status) = self.kind();

        // 5xx details stay in the log; clients get a generic line.
        let detail = if status.is_server_error() {
            tracing::error!(kind, "request failed: {}", self);
            "internal error".to_string()
        } else {
            tracing::warn!(kind, "request rejected: {}", self);
            self.to_string()
        };

        let body = ErrorBody {
            kind,
            detail,
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        assert_eq!(
            AppError::validation("x").kind(),
            ("invalid", StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            AppError::bad_request("x").kind().1,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("ticket").kind(),
            ("not_found", StatusCode::NOT_FOUND)
        );
        assert_eq!(
            AppError::external_service("vision", "boom").kind().1,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::service_unavailable("sender").kind().1,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::timeout("llm").kind().1,
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(AppError::not_found("segment").to_string(), "segment not found");
    }

    #[test]
    fn conflict_counts_as_unique_violation() {
        assert!(AppError::conflict("duplicate ticket").is_unique_violation());
        assert!(!AppError::validation("nope").is_unique_violation());
    }
}
