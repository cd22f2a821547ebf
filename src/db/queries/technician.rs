//! Technician profile queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{NearbyCandidate, RequestStatus, TechnicianProfile};

const PROFILE_COLUMNS: &str = r#"
    user_id, display_name, is_active,
    lat, lng, capability_ids,
    created_at, updated_at
"#;

/// Cap on candidate rows pulled for the radius filter
const NEARBY_CANDIDATE_LIMIT: i64 = 200;

pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<TechnicianProfile>> {
    let profile = sqlx::query_as::<_, TechnicianProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM technician_profiles WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Create or update the caller's profile. Omitted fields keep their
/// stored values; coordinates are only written when both are supplied.
pub async fn upsert_profile(
    pool: &PgPool,
    user_id: Uuid,
    display_name: Option<&str>,
    is_active: Option<bool>,
    lat: Option<f64>,
    lng: Option<f64>,
    capability_ids: Option<&[Uuid]>,
) -> Result<TechnicianProfile> {
    let profile = sqlx::query_as::<_, TechnicianProfile>(&format!(
        r#"
        INSERT INTO technician_profiles (
            user_id, display_name, is_active,
            lat, lng, capability_ids,
            created_at, updated_at
        )
        VALUES ($1, COALESCE($2, 'Technician'), COALESCE($3, TRUE), $4, $5, COALESCE($6, '{{}}'::uuid[]), NOW(), NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            display_name = COALESCE($2, technician_profiles.display_name),
            is_active = COALESCE($3, technician_profiles.is_active),
            lat = COALESCE($4, technician_profiles.lat),
            lng = COALESCE($5, technician_profiles.lng),
            capability_ids = COALESCE($6, technician_profiles.capability_ids),
            updated_at = NOW()
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(display_name)
    .bind(is_active)
    .bind(lat)
    .bind(lng)
    .bind(capability_ids)
    .fetch_one(pool)
    .await?;

    Ok(profile)
}

/// Pending requests the technician is capable of serving, before the
/// radius filter. Soonest appointments first.
pub async fn nearby_candidates(
    pool: &PgPool,
    capability_ids: &[Uuid],
) -> Result<Vec<NearbyCandidate>> {
    if capability_ids.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = sqlx::query_as::<_, NearbyCandidate>(
        r#"
        SELECT
            r.id AS service_request_id,
            r.service_id,
            s.name AS service_name,
            r.city,
            r.appointment_at,
            r.quantity,
            r.total_price,
            r.lat,
            r.lng
        FROM service_requests r
        INNER JOIN services s ON s.id = r.service_id
        WHERE r.status = $2
          AND r.service_id = ANY($1)
        ORDER BY r.appointment_at ASC
        LIMIT $3
        "#,
    )
    .bind(capability_ids)
    .bind(RequestStatus::Pending)
    .bind(NEARBY_CANDIDATE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(candidates)
}
