//! Unified application error model and mapping helpers.
//! One error enum is shared by the identity layer, the task store, the message bus
//! and both frontends (HTTP routes and the operation/subscription surface), along
//! with mappers to HTTP status codes and API extension codes.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Missing or malformed input (signup/login fields, task title, ...).
    Validation { code: String, message: String },
    /// Bad credentials at login. Same message for unknown email and wrong password.
    Authentication { code: String, message: String },
    /// Protected operation invoked without an authenticated identity.
    Authorization { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::Authentication { code, .. }
            | AppError::Authorization { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::Authentication { message, .. }
            | AppError::Authorization { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn authentication<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authentication { code: code.into(), message: msg.into() } }
    pub fn authorization<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authorization { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// The canonical "not authenticated" error raised by the authorization gate.
    pub fn unauthorized() -> Self { AppError::authorization("unauthorized", "Not authenticated") }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Authentication { .. } => 401,
            AppError::Authorization { .. } => 401,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
        }
    }

    /// Machine-readable classification carried in `extensions.code` of API errors.
    pub fn extension_code(&self) -> &'static str {
        match self {
            AppError::Authorization { .. } => "UNAUTHORIZED",
            AppError::NotFound { .. } => "NOT_FOUND",
            _ => "INTERNAL_SERVER_ERROR",
        }
    }

    /// API error object: `{message, extensions: {code, reason}}`.
    pub fn to_api_error(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message(),
            "extensions": { "code": self.extension_code(), "reason": self.code_str() }
        })
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
        // Unexpected failures surface as internal unless mapped closer to the source
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation { code: "bad_input".into(), message: err.to_string() }
    }
}
