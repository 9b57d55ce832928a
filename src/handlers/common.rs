use crate::{ApiResponse, ApiResult};
use axum::{http::StatusCode, response::Json};
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Result type for endpoints that create a resource
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServiceError>;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

/// Standard response for deletions
pub fn deleted_response(message: impl Into<String>) -> ApiResult<()> {
    Ok(Json(ApiResponse::message(message)))
}

/// Parses a path or query identifier, reporting the field name on failure
pub fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, ServiceError> {
    Uuid::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("{} must be a valid UUID", field)))
}
