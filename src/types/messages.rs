//! NATS envelope types
//!
//! Every subject carries a `Request<T>` and answers with either a
//! `SuccessResponse<T>` or an `ErrorResponse`. Error codes mirror the
//! HTTP taxonomy of the original public API:
//! `UNAUTHORIZED`, `VALIDATION_ERROR`, `FORBIDDEN`, `NOT_FOUND`,
//! `CONFLICT`, `RATE_LIMITED`, `DATABASE_ERROR`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// JWT access token issued by the auth provider
    #[serde(default)]
    pub token: Option<String>,
    pub payload: T,
}

impl<T> Request<T> {
    pub fn with_token(token: String, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token: Some(token),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Empty payload that accepts both `null` and `{}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// List request with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// List response with pagination info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_request_defaults() {
        let req: ListRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.limit, 50);
        assert_eq!(req.offset, 0);
    }

    #[test]
    fn test_request_token_optional() {
        let json = r#"{"id":"11111111-2222-3333-4444-555555555555","timestamp":"2026-01-01T00:00:00Z","payload":{}}"#;
        let req: Request<EmptyPayload> = serde_json::from_str(json).unwrap();
        assert!(req.token.is_none());
    }

    #[test]
    fn test_error_response_round_trip() {
        let err = ErrorResponse::new(Uuid::new_v4(), "CONFLICT", "job already claimed");
        let json = serde_json::to_string(&err).unwrap();
        let back: ErrorResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error.code, "CONFLICT");
        assert_eq!(back.error.message, "job already claimed");
    }
}
