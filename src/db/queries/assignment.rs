//! Technician assignment queries
//!
//! The accept path is the one place two technicians can race. The claim
//! is a conditional update on the request status (`WHERE status =
//! pending`) inside a transaction with the assignment upsert, so exactly
//! one concurrent accept can win; the partial unique index on accepted
//! assignments backs this at the schema level.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{AssignedJob, RequestStatus, ServiceRequest, TechnicianAssignment};

const ASSIGNMENT_COLUMNS: &str = r#"
    id, service_request_id, technician_id,
    accepted_at, rejected_at, created_at, updated_at
"#;

/// Result of an accept attempt
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The caller now holds the job
    Claimed(TechnicianAssignment),
    /// No such service request
    NotFound,
    /// The request was not pending — claimed by someone else, completed,
    /// or cancelled
    NotClaimable(RequestStatus),
}

/// Result of a completion attempt
#[derive(Debug)]
pub enum CompleteOutcome {
    Completed(ServiceRequest),
    /// The caller does not hold the accepted assignment
    NotAssigned,
    /// The request exists but is not in progress
    WrongStatus(RequestStatus),
    NotFound,
}

/// Atomically claim a pending request for `technician_id`.
pub async fn accept_job(
    pool: &PgPool,
    request_id: Uuid,
    technician_id: Uuid,
) -> Result<ClaimOutcome> {
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        "UPDATE service_requests SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
    )
    .bind(request_id)
    .bind(RequestStatus::Pending)
    .bind(RequestStatus::InProgress)
    .execute(&mut *tx)
    .await?;

    if claimed.rows_affected() == 0 {
        tx.rollback().await?;
        // Lost the race or bad id — classify for the caller
        let status: Option<(RequestStatus,)> =
            sqlx::query_as("SELECT status FROM service_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(pool)
                .await?;
        return Ok(match status {
            None => ClaimOutcome::NotFound,
            Some((s,)) => ClaimOutcome::NotClaimable(s),
        });
    }

    let assignment = sqlx::query_as::<_, TechnicianAssignment>(&format!(
        r#"
        INSERT INTO technician_assignments (
            id, service_request_id, technician_id,
            accepted_at, rejected_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, NOW(), NULL, NOW(), NOW())
        ON CONFLICT (service_request_id, technician_id) DO UPDATE
            SET accepted_at = NOW(), rejected_at = NULL, updated_at = NOW()
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(request_id)
    .bind(technician_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ClaimOutcome::Claimed(assignment))
}

/// Record that `technician_id` turned the job down. Never touches the
/// request status.
pub async fn reject_job(
    pool: &PgPool,
    request_id: Uuid,
    technician_id: Uuid,
) -> Result<Option<TechnicianAssignment>> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM service_requests WHERE id = $1)")
            .bind(request_id)
            .fetch_one(pool)
            .await?;
    if !exists {
        return Ok(None);
    }

    let assignment = sqlx::query_as::<_, TechnicianAssignment>(&format!(
        r#"
        INSERT INTO technician_assignments (
            id, service_request_id, technician_id,
            accepted_at, rejected_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, NULL, NOW(), NOW(), NOW())
        ON CONFLICT (service_request_id, technician_id) DO UPDATE
            SET rejected_at = NOW(), accepted_at = NULL, updated_at = NOW()
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(request_id)
    .bind(technician_id)
    .fetch_one(pool)
    .await?;

    Ok(Some(assignment))
}

/// Complete an in-progress request owned by `technician_id`.
///
/// Ownership and status are both part of the guarded update, so a
/// concurrently revoked assignment cannot slip a completion through.
pub async fn complete_job(
    pool: &PgPool,
    request_id: Uuid,
    technician_id: Uuid,
) -> Result<CompleteOutcome> {
    let request = sqlx::query_as::<_, ServiceRequest>(
        r#"
        UPDATE service_requests
        SET status = $3, updated_at = NOW()
        WHERE id = $1 AND status = $2
          AND EXISTS (
              SELECT 1 FROM technician_assignments a
              WHERE a.service_request_id = $1
                AND a.technician_id = $4
                AND a.accepted_at IS NOT NULL
          )
        RETURNING
            id, customer_id, service_id,
            street, city, postal_code, lat, lng,
            appointment_at, quantity, total_price,
            promo_code, discount_amount,
            payment_intent_id, paid_at,
            status, created_at, updated_at
        "#,
    )
    .bind(request_id)
    .bind(RequestStatus::InProgress)
    .bind(RequestStatus::Completed)
    .bind(technician_id)
    .fetch_optional(pool)
    .await?;

    if let Some(request) = request {
        return Ok(CompleteOutcome::Completed(request));
    }

    // The guard matched nothing — classify for the caller
    let assignment = get_assignment(pool, request_id, technician_id).await?;
    if !assignment.map(|a| a.is_accepted()).unwrap_or(false) {
        return Ok(CompleteOutcome::NotAssigned);
    }

    let status: Option<(RequestStatus,)> =
        sqlx::query_as("SELECT status FROM service_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(pool)
            .await?;
    Ok(match status {
        None => CompleteOutcome::NotFound,
        Some((s,)) => CompleteOutcome::WrongStatus(s),
    })
}

/// Get the caller's assignment for a request, if any
pub async fn get_assignment(
    pool: &PgPool,
    request_id: Uuid,
    technician_id: Uuid,
) -> Result<Option<TechnicianAssignment>> {
    let assignment = sqlx::query_as::<_, TechnicianAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM technician_assignments
        WHERE service_request_id = $1 AND technician_id = $2
        "#
    ))
    .bind(request_id)
    .bind(technician_id)
    .fetch_optional(pool)
    .await?;

    Ok(assignment)
}

/// The technician's accepted, not-yet-completed jobs
pub async fn list_accepted_jobs(pool: &PgPool, technician_id: Uuid) -> Result<Vec<AssignedJob>> {
    let jobs = sqlx::query_as::<_, AssignedJob>(
        r#"
        SELECT
            r.id AS service_request_id,
            s.name AS service_name,
            r.street, r.city, r.postal_code,
            r.appointment_at, r.quantity, r.total_price,
            r.status,
            a.accepted_at
        FROM technician_assignments a
        INNER JOIN service_requests r ON r.id = a.service_request_id
        INNER JOIN services s ON s.id = r.service_id
        WHERE a.technician_id = $1
          AND a.accepted_at IS NOT NULL
          AND r.status = $2
        ORDER BY r.appointment_at ASC
        "#,
    )
    .bind(technician_id)
    .bind(RequestStatus::InProgress)
    .fetch_all(pool)
    .await?;

    Ok(jobs)
}
