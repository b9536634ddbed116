// src/error.rs
use crate::guards::Conflict;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Authentication credentials were not provided or are invalid")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } => code,
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "not_authenticated",
            Self::Forbidden(_) => "permission_denied",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
            "Internal server error".to_string()
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
            self.to_string()
        };

        HttpResponse::build(status).json(json!({
            "error": self.code(),
            "message": message,
        }))
    }
}

impl From<Conflict> for ApiError {
    fn from(conflict: Conflict) -> Self {
        Self::validation(conflict.code(), conflict.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(constraint) = db_err.constraint() {
                if let Some(conflict) = Conflict::from_constraint(constraint) {
                    return conflict.into();
                }
                match constraint {
                    "users_email_key" => {
                        return Self::validation("email_taken", "A user with that email already exists");
                    }
                    "users_username_key" => {
                        return Self::validation(
                            "username_taken",
                            "A user with that username already exists",
                        );
                    }
                    "unique_tag_slug" => {
                        return Self::validation("slug_taken", "A tag with that slug already exists");
                    }
                    _ => {}
                }
            }
        }
        Self::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::validation("invalid_field", err.to_string())
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("password hashing failed: {err}"))
    }
}
