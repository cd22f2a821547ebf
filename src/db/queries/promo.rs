//! Discount code queries
//!
//! Consuming a use is a single guarded UPDATE that re-checks the active
//! flag, the validity window, and the remaining usage in the same
//! statement. Concurrent applies serialize on the row, so `used_count`
//! can never overrun `usage_limit`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::promo::{check_usable, PromoRejection};
use crate::types::{DiscountCode, DiscountType};

const CODE_COLUMNS: &str = r#"
    id, code, discount_type, value,
    usage_limit, used_count,
    starts_at, ends_at, is_active,
    created_at, updated_at
"#;

/// Result of an apply attempt
#[derive(Debug)]
pub enum ApplyOutcome {
    Applied(DiscountCode),
    NotFound,
    Rejected(PromoRejection),
}

/// Look up a code, case-insensitively
pub async fn get_by_code(pool: &PgPool, code: &str) -> Result<Option<DiscountCode>> {
    let row = sqlx::query_as::<_, DiscountCode>(&format!(
        "SELECT {CODE_COLUMNS} FROM discount_codes WHERE LOWER(code) = LOWER($1)"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Consume one use of `code`, guarded against expiry and exhaustion.
pub async fn apply_code(pool: &PgPool, code: &str) -> Result<ApplyOutcome> {
    let row = sqlx::query_as::<_, DiscountCode>(&format!(
        r#"
        UPDATE discount_codes
        SET used_count = used_count + 1, updated_at = NOW()
        WHERE LOWER(code) = LOWER($1)
          AND is_active
          AND NOW() BETWEEN starts_at AND ends_at
          AND used_count < usage_limit
        RETURNING {CODE_COLUMNS}
        "#
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;

    if let Some(applied) = row {
        return Ok(ApplyOutcome::Applied(applied));
    }

    // The guard matched nothing — re-read once to tell the caller why.
    match get_by_code(pool, code).await? {
        None => Ok(ApplyOutcome::NotFound),
        Some(existing) => Ok(match check_usable(&existing, Utc::now()) {
            Err(rejection) => ApplyOutcome::Rejected(rejection),
            // The guard lost a race that has since resolved; exhaustion is
            // the only self-healing cause
            Ok(()) => ApplyOutcome::Rejected(PromoRejection::Exhausted),
        }),
    }
}

/// Create a discount code. A unique violation on the code string is
/// surfaced to the caller through the sqlx error.
pub async fn create_code(
    pool: &PgPool,
    code: &str,
    discount_type: DiscountType,
    value: f64,
    usage_limit: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<DiscountCode, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>(&format!(
        r#"
        INSERT INTO discount_codes (
            id, code, discount_type, value,
            usage_limit, used_count,
            starts_at, ends_at, is_active,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, 0, $6, $7, TRUE, NOW(), NOW())
        RETURNING {CODE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(discount_type)
    .bind(value)
    .bind(usage_limit)
    .bind(starts_at)
    .bind(ends_at)
    .fetch_one(pool)
    .await
}

/// List codes, newest first
pub async fn list_codes(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<DiscountCode>, i64)> {
    let codes = sqlx::query_as::<_, DiscountCode>(&format!(
        "SELECT {CODE_COLUMNS} FROM discount_codes ORDER BY created_at DESC LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discount_codes")
        .fetch_one(pool)
        .await?;

    Ok((codes, total))
}

/// Deactivate a code
pub async fn deactivate(pool: &PgPool, code: &str) -> Result<Option<DiscountCode>> {
    let row = sqlx::query_as::<_, DiscountCode>(&format!(
        r#"
        UPDATE discount_codes
        SET is_active = FALSE, updated_at = NOW()
        WHERE LOWER(code) = LOWER($1)
        RETURNING {CODE_COLUMNS}
        "#
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
