//! Service catalog queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Service, ServiceCategory};

const CATEGORY_COLUMNS: &str = "id, name, description, is_active, created_at, updated_at";

const SERVICE_COLUMNS: &str = r#"
    id, category_id, name, description,
    base_price, duration_minutes, is_active,
    created_at, updated_at
"#;

/// Result of a catalog delete, which falls back to deactivation for rows
/// still referenced elsewhere
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Row was referenced, so it was soft-deleted instead
    Deactivated,
    NotFound,
}

// ============================================================================
// Categories
// ============================================================================

pub async fn list_categories(
    pool: &PgPool,
    include_inactive: bool,
) -> Result<Vec<ServiceCategory>> {
    let categories = sqlx::query_as::<_, ServiceCategory>(&format!(
        r#"
        SELECT {CATEGORY_COLUMNS}
        FROM service_categories
        WHERE is_active OR $1
        ORDER BY name
        "#
    ))
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(categories)
}

pub async fn create_category(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
) -> Result<ServiceCategory> {
    let category = sqlx::query_as::<_, ServiceCategory>(&format!(
        r#"
        INSERT INTO service_categories (id, name, description, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, TRUE, NOW(), NOW())
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;

    Ok(category)
}

pub async fn update_category(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    is_active: Option<bool>,
) -> Result<Option<ServiceCategory>> {
    let category = sqlx::query_as::<_, ServiceCategory>(&format!(
        r#"
        UPDATE service_categories
        SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            is_active = COALESCE($4, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;

    Ok(category)
}

pub async fn delete_category(pool: &PgPool, id: Uuid) -> Result<DeleteOutcome> {
    let result = sqlx::query("DELETE FROM service_categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() > 0 => Ok(DeleteOutcome::Deleted),
        Ok(_) => Ok(DeleteOutcome::NotFound),
        Err(e) if is_foreign_key_violation(&e) => {
            let deactivated =
                sqlx::query("UPDATE service_categories SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .execute(pool)
                    .await?;
            if deactivated.rows_affected() > 0 {
                Ok(DeleteOutcome::Deactivated)
            } else {
                Ok(DeleteOutcome::NotFound)
            }
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Services
// ============================================================================

pub async fn list_services(
    pool: &PgPool,
    include_inactive: bool,
    category_id: Option<Uuid>,
) -> Result<Vec<Service>> {
    let services = sqlx::query_as::<_, Service>(&format!(
        r#"
        SELECT {SERVICE_COLUMNS}
        FROM services
        WHERE (is_active OR $1)
          AND ($2::uuid IS NULL OR category_id = $2)
        ORDER BY name
        "#
    ))
    .bind(include_inactive)
    .bind(category_id)
    .fetch_all(pool)
    .await?;

    Ok(services)
}

pub async fn get_service(pool: &PgPool, id: Uuid) -> Result<Option<Service>> {
    let service = sqlx::query_as::<_, Service>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(service)
}

pub async fn create_service(
    pool: &PgPool,
    category_id: Uuid,
    name: &str,
    description: Option<&str>,
    base_price: f64,
    duration_minutes: i32,
) -> Result<Service> {
    let service = sqlx::query_as::<_, Service>(&format!(
        r#"
        INSERT INTO services (
            id, category_id, name, description,
            base_price, duration_minutes, is_active,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW(), NOW())
        RETURNING {SERVICE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(category_id)
    .bind(name)
    .bind(description)
    .bind(base_price)
    .bind(duration_minutes)
    .fetch_one(pool)
    .await?;

    Ok(service)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_service(
    pool: &PgPool,
    id: Uuid,
    category_id: Option<Uuid>,
    name: Option<&str>,
    description: Option<&str>,
    base_price: Option<f64>,
    duration_minutes: Option<i32>,
    is_active: Option<bool>,
) -> Result<Option<Service>> {
    let service = sqlx::query_as::<_, Service>(&format!(
        r#"
        UPDATE services
        SET
            category_id = COALESCE($2, category_id),
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            base_price = COALESCE($5, base_price),
            duration_minutes = COALESCE($6, duration_minutes),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {SERVICE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(category_id)
    .bind(name)
    .bind(description)
    .bind(base_price)
    .bind(duration_minutes)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;

    Ok(service)
}

pub async fn delete_service(pool: &PgPool, id: Uuid) -> Result<DeleteOutcome> {
    let result = sqlx::query("DELETE FROM services WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() > 0 => Ok(DeleteOutcome::Deleted),
        Ok(_) => Ok(DeleteOutcome::NotFound),
        Err(e) if is_foreign_key_violation(&e) => {
            let deactivated =
                sqlx::query("UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .execute(pool)
                    .await?;
            if deactivated.rows_affected() > 0 {
                Ok(DeleteOutcome::Deactivated)
            } else {
                Ok(DeleteOutcome::NotFound)
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_foreign_key_violation())
        .unwrap_or(false)
}
