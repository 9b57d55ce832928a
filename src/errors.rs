use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, TransactionError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error body returned to API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable description carrying the originating reason
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    /// ISO 8601 timestamp when the error was produced
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock for {item}. Requested: {requested}, Available: {available}")]
    InsufficientStock {
        item: String,
        requested: i32,
        available: i32,
    },

    #[error("Request already processed: {0}")]
    AlreadyProcessed(Uuid),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Cannot return more than pending. Pending: {pending}")]
    ExceedsPending { pending: i32 },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Flattens the error of a `TransactionTrait::transaction` call whose closure
/// already speaks `ServiceError`.
impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        }
    }
}

impl ServiceError {
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    pub fn insufficient_stock(item: impl Into<String>, requested: i32, available: i32) -> Self {
        ServiceError::InsufficientStock {
            item: item.into(),
            requested,
            available,
        }
    }

    /// HTTP status for the error body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidAction(_)
            | Self::InvalidStatus(_)
            | Self::EmptyCart => StatusCode::BAD_REQUEST,
            Self::AlreadyProcessed(_) | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::InsufficientStock { .. } | Self::ExceedsPending { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::InvalidAction(_) => "invalid_action",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidStatus(_) => "invalid_status",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::ExceedsPending { .. } => "exceeds_pending",
            Self::EmptyCart => "empty_cart",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Client-facing message; storage and internal failures are masked.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Storage failure".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::insufficient_stock("Gauze", 5, 2).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::AlreadyProcessed(Uuid::nil()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::InvalidAction("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ExceedsPending { pending: 1 }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_stock_message_names_item_and_available_quantity() {
        let err = ServiceError::insufficient_stock("Surgical Gloves", 12, 4);
        assert_eq!(
            err.response_message(),
            "Insufficient stock for Surgical Gloves. Requested: 12, Available: 4"
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("password=secret".into()))
                .response_message(),
            "Storage failure"
        );
        assert_eq!(
            ServiceError::InternalError("queue closed".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::ExceedsPending { pending: 2 }.response_message(),
            "Cannot return more than pending. Pending: 2"
        );
    }

    #[test]
    fn transaction_errors_flatten_into_service_errors() {
        let err: ServiceError = TransactionError::Transaction(ServiceError::EmptyCart).into();
        assert!(matches!(err, ServiceError::EmptyCart));

        let err: ServiceError =
            TransactionError::<ServiceError>::Connection(DbErr::Custom("down".into())).into();
        assert!(matches!(err, ServiceError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn error_response_carries_code_and_reason() {
        let response = ServiceError::AlreadyProcessed(Uuid::nil()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "already_processed");
        assert_eq!(payload.error, "Conflict");
        assert!(payload.message.starts_with("Request already processed"));
    }
}
