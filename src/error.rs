//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Construction-time failures: model schemas, route trees, migration loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("model {model}: field '{field}' declared twice")]
    DuplicateField { model: String, field: String },
    #[error("model {model}: second identifier field '{field}' (at most one allowed)")]
    DuplicateIdentifier { model: String, field: String },
    #[error("model {model}: no identifier field declared")]
    NoIdentifier { model: String },
    #[error("model {model}: unknown field '{field}'")]
    UnknownField { model: String, field: String },
    #[error("route child '{0}' declared twice")]
    DuplicateRoute(String),
    #[error("action '{0}' declared twice")]
    DuplicateAction(String),
    #[error("resource '{0}' is registered to two locators")]
    DuplicateLocator(String),
    #[error("migration load: {0}")]
    Migration(String),
    #[error("migration dependency '{token}' matches no file")]
    UnknownDependency { token: String },
    #[error("migration dependency '{token}' is ambiguous: {matches:?}")]
    AmbiguousDependency { token: String, matches: Vec<String> },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("field '{field}': value {value} is not a valid {expected}")]
    TypeMismatch {
        field: String,
        value: serde_json::Value,
        expected: &'static str,
    },
    #[error("field '{0}' is required")]
    Required(String),
    #[error("field '{0}' is read-only")]
    ReadOnly(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("update matched {affected} rows in '{table}', expected exactly one")]
    MultipleRows { table: String, affected: u64 },
    #[error("storage engine requested before configuration")]
    EngineNotConfigured,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::TypeMismatch { .. } | AppError::Required(_) | AppError::ReadOnly(_) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::MultipleRows { .. } => (StatusCode::CONFLICT, "multiple_rows"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
