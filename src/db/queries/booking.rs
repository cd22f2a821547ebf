//! Service request (booking) queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{BookingDetail, RequestStatus, ServiceRequest};

const REQUEST_COLUMNS: &str = r#"
    id, customer_id, service_id,
    street, city, postal_code, lat, lng,
    appointment_at, quantity, total_price,
    promo_code, discount_amount,
    payment_intent_id, paid_at,
    status, created_at, updated_at
"#;

/// Create a new service request in `pending` status
#[allow(clippy::too_many_arguments)]
pub async fn create_request(
    pool: &PgPool,
    customer_id: Uuid,
    service_id: Uuid,
    street: &str,
    city: &str,
    postal_code: &str,
    lat: Option<f64>,
    lng: Option<f64>,
    appointment_at: DateTime<Utc>,
    quantity: i32,
    total_price: f64,
    promo_code: Option<&str>,
    discount_amount: Option<f64>,
) -> Result<ServiceRequest> {
    let request = sqlx::query_as::<_, ServiceRequest>(&format!(
        r#"
        INSERT INTO service_requests (
            id, customer_id, service_id,
            street, city, postal_code, lat, lng,
            appointment_at, quantity, total_price,
            promo_code, discount_amount,
            status, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW())
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(service_id)
    .bind(street)
    .bind(city)
    .bind(postal_code)
    .bind(lat)
    .bind(lng)
    .bind(appointment_at)
    .bind(quantity)
    .bind(total_price)
    .bind(promo_code)
    .bind(discount_amount)
    .bind(RequestStatus::Pending)
    .fetch_one(pool)
    .await?;

    Ok(request)
}

/// Get a request owned by `customer_id`
pub async fn get_request_for_customer(
    pool: &PgPool,
    id: Uuid,
    customer_id: Uuid,
) -> Result<Option<ServiceRequest>> {
    let request = sqlx::query_as::<_, ServiceRequest>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = $1 AND customer_id = $2"
    ))
    .bind(id)
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(request)
}

/// Get a request with service name and accepted technician, for detail views
pub async fn get_booking_detail(
    pool: &PgPool,
    id: Uuid,
    customer_id: Uuid,
) -> Result<Option<BookingDetail>> {
    let detail = sqlx::query_as::<_, BookingDetail>(
        r#"
        SELECT
            r.id, r.customer_id, r.service_id,
            r.street, r.city, r.postal_code, r.lat, r.lng,
            r.appointment_at, r.quantity, r.total_price,
            r.promo_code, r.discount_amount,
            r.payment_intent_id, r.paid_at,
            r.status, r.created_at, r.updated_at,
            s.name AS service_name,
            a.technician_id
        FROM service_requests r
        INNER JOIN services s ON s.id = r.service_id
        LEFT JOIN technician_assignments a
            ON a.service_request_id = r.id AND a.accepted_at IS NOT NULL
        WHERE r.id = $1 AND r.customer_id = $2
        "#,
    )
    .bind(id)
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(detail)
}

/// List the customer's requests, newest first
pub async fn list_requests_for_customer(
    pool: &PgPool,
    customer_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ServiceRequest>, i64)> {
    let requests = sqlx::query_as::<_, ServiceRequest>(&format!(
        r#"
        SELECT {REQUEST_COLUMNS}
        FROM service_requests
        WHERE customer_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(customer_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM service_requests WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(pool)
            .await?;

    Ok((requests, total))
}

/// Cancel a pending request owned by `customer_id`.
///
/// Conditional update: only `pending → cancelled` is allowed, so a
/// concurrently accepted job cannot be cancelled out from under its
/// technician. Returns `None` when the guard matched nothing; the caller
/// classifies why.
pub async fn cancel_request(
    pool: &PgPool,
    id: Uuid,
    customer_id: Uuid,
) -> Result<Option<ServiceRequest>> {
    let request = sqlx::query_as::<_, ServiceRequest>(&format!(
        r#"
        UPDATE service_requests
        SET status = $4, updated_at = NOW()
        WHERE id = $1 AND customer_id = $2 AND status = $3
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(customer_id)
    .bind(RequestStatus::Pending)
    .bind(RequestStatus::Cancelled)
    .fetch_optional(pool)
    .await?;

    Ok(request)
}
