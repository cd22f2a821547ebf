//! Technician assignment types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The record of a technician accepting or rejecting a service request.
///
/// At most one assignment per request may carry a non-null `accepted_at`;
/// the schema enforces this with a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianAssignment {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub technician_id: Uuid,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TechnicianAssignment {
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }
}

/// Payload for accept / reject / complete job operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionRequest {
    pub service_request_id: Uuid,
}

/// An accepted job in the technician's work list
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssignedJob {
    pub service_request_id: Uuid,
    pub service_name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub appointment_at: DateTime<Utc>,
    pub quantity: i32,
    pub total_price: f64,
    pub status: super::request::RequestStatus,
    pub accepted_at: DateTime<Utc>,
}
