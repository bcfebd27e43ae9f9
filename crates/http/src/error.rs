//! Error handling for the natours HTTP layer
//!
//! Handlers return [`AppError`]. Its response carries the production body and
//! an [`ErrorReport`] extension; [`format_errors`] is the single place that
//! decides how much of that report the client sees.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use natours_db::StoreError;
use natours_kernel::settings::Environment;
use serde_json::{json, Value};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const GENERIC_MESSAGE: &str = "Something went very wrong";

/// Application error types that map to HTTP responses
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        details: Vec<Value>,
        message: String,
    },

    #[error("{message}")]
    Cast { message: String },

    #[error("{message}")]
    DuplicateKey { message: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    PageNotFound { message: String },

    #[error("{message}")]
    Timeout { message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Create a validation error from `(field, message)` pairs
    pub fn validation<'a>(violations: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        let mut messages = Vec::new();
        let mut details = Vec::new();
        for (field, message) in violations {
            details.push(json!({ "field": field, "message": message }));
            messages.push(message);
        }
        Self::Validation {
            details,
            message: format!("Invalid input data. {}", messages.join(". ")),
        }
    }

    /// Create a cast error for a malformed value at `path`
    pub fn cast(path: &str, value: &str) -> Self {
        Self::Cast {
            message: format!("Invalid {path}: {value}"),
        }
    }

    /// Create a duplicate key error
    pub fn duplicate_key(value: &str) -> Self {
        Self::DuplicateKey {
            message: format!("Duplicate field value: \"{value}\". Please use another value!"),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create the error for a page past the end of the result set
    pub fn page_not_found() -> Self {
        Self::PageNotFound {
            message: "This page does not exist".to_string(),
        }
    }

    /// Create the error for a request that outlived the server timeout
    pub fn timeout() -> Self {
        Self::Timeout {
            message: "Request timed out, please try again later".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::Cast { .. }
            | AppError::DuplicateKey { .. }
            | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } | AppError::PageNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "ValidationError",
            AppError::Cast { .. } => "CastError",
            AppError::DuplicateKey { .. } => "DuplicateKey",
            AppError::BadRequest { .. } => "BadRequest",
            AppError::NotFound { .. } => "NotFound",
            AppError::PageNotFound { .. } => "PageNotFound",
            AppError::Timeout { .. } => "RequestTimeout",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Anticipated failures whose message is safe to show to clients
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cast { path, value, .. } => AppError::cast(&path, &value),
            StoreError::DuplicateKey { value, .. } => AppError::duplicate_key(&value),
            StoreError::UnknownField(path) => {
                AppError::bad_request(format!("Unknown field \"{path}\" in query"))
            }
            StoreError::InvalidProjection(message) => AppError::bad_request(message),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

/// Everything known about a failed request, kept for the error formatter.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error_id: Uuid,
    pub status_code: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Vec<Value>,
    pub operational: bool,
    pub stack: String,
    pub timestamp: String,
}

impl ErrorReport {
    fn status(&self) -> &'static str {
        if self.status_code.is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    /// Body shown in production: operational messages only.
    pub fn production_body(&self) -> Value {
        if self.operational {
            json!({ "status": self.status(), "message": self.message })
        } else {
            json!({ "status": "error", "message": GENERIC_MESSAGE })
        }
    }

    /// Body shown outside production: the whole report.
    pub fn development_body(&self) -> Value {
        json!({
            "status": self.status(),
            "error": {
                "code": self.code,
                "statusCode": self.status_code.as_u16(),
                "isOperational": self.operational,
                "details": self.details,
                "traceId": self.error_id.to_string(),
                "timestamp": self.timestamp,
            },
            "message": self.message,
            "stack": self.stack,
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let report = ErrorReport {
            error_id: Uuid::new_v4(),
            status_code: status,
            code: self.code(),
            message: self.to_string(),
            details: match &self {
                AppError::Validation { details, .. } => details.clone(),
                _ => Vec::new(),
            },
            operational: self.is_operational(),
            stack: format!("{self:?}"),
            timestamp: OffsetDateTime::now_utc().to_string(),
        };

        if report.operational {
            tracing::debug!(
                error_id = %report.error_id,
                error_code = report.code,
                status_code = %status.as_u16(),
                "request failed: {}",
                report.message
            );
        } else {
            tracing::error!(
                error_id = %report.error_id,
                error_code = report.code,
                status_code = %status.as_u16(),
                error = ?self,
                "ERROR!"
            );
        }

        let mut response = (status, Json(report.production_body())).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Give the bare 408 produced by the timeout layer the usual error envelope.
pub async fn envelope_timeouts(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() == StatusCode::REQUEST_TIMEOUT
        && response.extensions().get::<ErrorReport>().is_none()
    {
        return AppError::timeout().into_response();
    }
    response
}

/// Rewrite error bodies for the current environment.
pub async fn format_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if environment.is_production() {
        return response;
    }
    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    let body: Body = Json(report.development_body()).into_response().into_body();
    Response::from_parts(parts, body)
}
