//! Technician profile types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Technician profile entity, keyed by the auth provider's user id
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_active: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Services this technician can perform
    pub capability_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TechnicianProfile {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

/// Request to create or update the caller's technician profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub is_active: Option<bool>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub capability_ids: Option<Vec<Uuid>>,
}

/// Request for jobs near the technician.
///
/// Explicit coordinates take precedence over the stored profile position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyJobsRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// A pending request within range, annotated with its distance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyJob {
    pub service_request_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub city: String,
    pub appointment_at: DateTime<Utc>,
    pub quantity: i32,
    pub total_price: f64,
    pub distance_km: f64,
}

/// Raw nearby candidate as read from the database, before the radius filter
#[derive(Debug, Clone, FromRow)]
pub struct NearbyCandidate {
    pub service_request_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub city: String,
    pub appointment_at: DateTime<Utc>,
    pub quantity: i32,
    pub total_price: f64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Response for the nearby jobs query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyJobsResponse {
    pub jobs: Vec<NearbyJob>,
    pub radius_km: f64,
}
