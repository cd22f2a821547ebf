//! Service request types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Service request lifecycle status.
///
/// Stored as the numeric codes the rest of the platform uses:
/// 1 = pending, 2 = in progress, 3 = completed, 4 = cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending = 1,
    InProgress = 2,
    Completed = 3,
    Cancelled = 4,
}

impl RequestStatus {
    /// Whether a transition from `self` to `next` is a legal lifecycle step.
    ///
    /// pending → in_progress (accept), pending → cancelled (customer),
    /// in_progress → completed (technician). Everything else is rejected.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::InProgress)
                | (RequestStatus::Pending, RequestStatus::Cancelled)
                | (RequestStatus::InProgress, RequestStatus::Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

/// Service request entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,

    // Address
    pub street: String,
    pub city: String,
    pub postal_code: String,

    // Coordinates (resolved by the caller's geocoding flow)
    pub lat: Option<f64>,
    pub lng: Option<f64>,

    pub appointment_at: DateTime<Utc>,
    pub quantity: i32,
    pub total_price: f64,

    // Promo linkage
    pub promo_code: Option<String>,
    pub discount_amount: Option<f64>,

    // Payment linkage, written by the external gateway flow
    pub payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,

    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a booking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub appointment_at: DateTime<Utc>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub promo_code: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

/// Payload carrying a single booking id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingIdRequest {
    pub id: Uuid,
}

/// Booking with joined service name and accepted technician, for detail views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub service_name: String,
    pub technician_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_only_from_in_progress() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ] {
            assert!(
                !status.can_transition_to(RequestStatus::Completed),
                "{} must not complete",
                status.as_str()
            );
        }
        assert!(RequestStatus::InProgress.can_transition_to(RequestStatus::Completed));
    }

    #[test]
    fn test_accept_only_from_pending() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::InProgress));
        assert!(!RequestStatus::InProgress.can_transition_to(RequestStatus::InProgress));
        assert!(!RequestStatus::Completed.can_transition_to(RequestStatus::InProgress));
        assert!(!RequestStatus::Cancelled.can_transition_to(RequestStatus::InProgress));
    }

    #[test]
    fn test_cancel_only_from_pending() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Cancelled));
        assert!(!RequestStatus::InProgress.can_transition_to(RequestStatus::Cancelled));
        assert!(!RequestStatus::Completed.can_transition_to(RequestStatus::Cancelled));
    }

    #[test]
    fn test_status_serializes_as_name() {
        let json = serde_json::to_string(&RequestStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
