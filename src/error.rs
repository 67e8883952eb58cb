//! Unified application error model and mapping helpers.
//! Every error is recovered at the request boundary and surfaced as a
//! structured JSON response; none are fatal to the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Malformed submitted content, e.g. an empty required field.
    Validation { code: String, message: String },
    /// Neither token nor password matched, or credentials are required.
    Auth { code: String, message: String },
    /// Valid identity, refused operation (unconfirmed account, not the author).
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    /// Duplicate email or username.
    Conflict { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Validation { code: code.into(), message: msg.into() }
    }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Auth { code: code.into(), message: msg.into() }
    }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Forbidden { code: code.into(), message: msg.into() }
    }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Conflict { code: code.into(), message: msg.into() }
    }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Internal { code: code.into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
        }
    }

    /// Short error label used as the `error` field of JSON responses.
    pub fn error_str(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "bad request",
            AppError::Auth { .. } => "unauthorized",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound { .. } => "not found",
            AppError::Conflict { .. } => "conflict",
            AppError::Internal { .. } => "internal server error",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.error_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}
