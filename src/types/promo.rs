//! Discount code types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Discount type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "discount_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `value` is a percentage of the total (0–100)
    Percentage,
    /// `value` is an absolute amount, clamped to the total
    Fixed,
}

/// Discount code entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: f64,
    pub usage_limit: i32,
    pub used_count: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountCode {
    pub fn remaining_uses(&self) -> i32 {
        self.usage_limit - self.used_count
    }
}

/// Request to validate a promo code against an order total
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoRequest {
    pub code: String,
    pub total_amount: f64,
}

/// Result of a successful validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoResponse {
    pub code: String,
    pub discount_amount: f64,
    pub remaining_uses: i32,
}

/// Request to consume one use of a promo code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPromoRequest {
    pub code: String,
}

/// Result of a successful apply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPromoResponse {
    pub code: String,
    pub remaining_uses: i32,
}

/// Admin request to create a discount code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromoRequest {
    /// Generated when omitted
    pub code: Option<String>,
    pub discount_type: DiscountType,
    pub value: f64,
    pub usage_limit: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Admin request to deactivate a discount code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivatePromoRequest {
    pub code: String,
}
