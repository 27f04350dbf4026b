//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use botlist_core::authz::AuthzError;
use botlist_core::perms::PermissionError;
use botlist_core::ratelimit::{Limit, RateLimitError};
use botlist_core::store::StoreError;
use botlist_core::teams::TeamError;
use botlist_core::votes::VoteError;
use botlist_core::webhooks::{DispatchError, WebhookError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::middleware::ratelimit::limit_headers;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String, fields: Vec<String> },

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited on bucket {}", .0.bucket)]
    RateLimited(Limit),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Internal server error")]
    Fatal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_fields(message: impl Into<String>, fields: Vec<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
            fields,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [String]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, fields) = match &self {
            AppError::InvalidInput { message, fields } => {
                (StatusCode::BAD_REQUEST, message.as_str(), Some(fields.as_slice()))
            }
            AppError::Unauthenticated(m) => (StatusCode::UNAUTHORIZED, m.as_str(), None),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m.as_str(), None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.as_str(), None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.as_str(), None),
            AppError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "You are being rate limited",
                None,
            ),
            AppError::Transient(detail) => {
                error!(detail = %detail, "Transient server failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Temporarily unavailable, try again later",
                    None,
                )
            }
            AppError::Fatal(detail) => {
                error!(detail = %detail, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = Json(ErrorBody {
            message,
            error: true,
            fields,
        });
        let mut response = (status, body).into_response();
        if let AppError::RateLimited(limit) = &self {
            response.headers_mut().extend(limit_headers(limit));
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Transient(e.to_string())
            }
            _ => AppError::Fatal(e.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::DbError(e) => AppError::from(e),
        }
    }
}

impl From<AuthzError> for AppError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::Unauthenticated => AppError::Unauthenticated("Authentication required".into()),
            AuthzError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthzError::NotFound(msg) => AppError::NotFound(msg),
            AuthzError::Conflict(msg) => AppError::Conflict(msg),
            AuthzError::Store(e) => AppError::from(e),
        }
    }
}

impl From<PermissionError> for AppError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::InvalidPermission(_) => AppError::invalid(e.to_string()),
            PermissionError::Delegation(msg) => AppError::Forbidden(msg),
        }
    }
}

impl From<TeamError> for AppError {
    fn from(e: TeamError) -> Self {
        match e {
            TeamError::NotFound(msg) => AppError::NotFound(msg),
            TeamError::Conflict(msg) => AppError::Conflict(msg),
            TeamError::Forbidden(msg) => AppError::Forbidden(msg),
            TeamError::InvalidInput(msg) => AppError::invalid(msg),
            TeamError::Authz(e) => AppError::from(e),
            TeamError::Store(e) => AppError::from(e),
            TeamError::DbError(e) => AppError::from(e),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::InvalidInput { message, fields } => {
                AppError::invalid_fields(message, fields)
            }
            WebhookError::NotFound(id) => AppError::NotFound(format!("webhook {id}")),
            WebhookError::Store(e) => AppError::from(e),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::ShuttingDown => AppError::Transient(e.to_string()),
            DispatchError::Store(e) => AppError::from(e),
            DispatchError::Encode(_) | DispatchError::Client(_) => AppError::Fatal(e.to_string()),
        }
    }
}

impl From<VoteError> for AppError {
    fn from(e: VoteError) -> Self {
        match e {
            VoteError::NotFound(msg) => AppError::NotFound(msg),
            VoteError::InvalidTarget | VoteError::AlreadyVoted { .. } | VoteError::NothingToRedeem => {
                AppError::invalid(e.to_string())
            }
            VoteError::VoteBanned(_) => AppError::Forbidden(e.to_string()),
            VoteError::Store(e) => AppError::from(e),
            VoteError::Dispatch(e) => AppError::from(e),
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(e: RateLimitError) -> Self {
        AppError::Transient(e.to_string())
    }
}
