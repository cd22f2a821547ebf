//! Promo code message handlers
//!
//! validate/apply are open to any authenticated caller but rate-limited
//! per user; create/list/deactivate require the admin role.

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use chrono::Utc;
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth;
use crate::db::queries;
use crate::db::queries::promo::ApplyOutcome;
use crate::services::promo::{self, PromoRejection};
use crate::services::rate_limiter::RateLimiter;
use crate::types::{
    ApplyPromoRequest, ApplyPromoResponse, CreatePromoRequest, DeactivatePromoRequest,
    DiscountType, ErrorResponse, ListRequest, ListResponse, Request, SuccessResponse,
    ValidatePromoRequest, ValidatePromoResponse,
};

/// Handle promo.validate messages
pub async fn handle_validate(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
    limiter: Arc<RateLimiter>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received promo.validate message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ValidatePromoRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let user_id = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info.user_id,
            Err(_) => {
                let error =
                    ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        if !limiter.check_and_record(user_id) {
            warn!("Promo validate rate limit hit for user {}", user_id);
            let error = ErrorResponse::new(
                request.id,
                "RATE_LIMITED",
                "Too many promo attempts, try again later",
            );
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        let payload = request.payload;
        if payload.total_amount < 0.0 {
            let error = ErrorResponse::new(
                request.id,
                "VALIDATION_ERROR",
                "Total amount must not be negative",
            );
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        match queries::promo::get_by_code(&pool, &payload.code).await {
            Ok(Some(code)) => match promo::evaluate(&code, payload.total_amount, Utc::now()) {
                Ok(amount) => {
                    let response = SuccessResponse::new(
                        request.id,
                        ValidatePromoResponse {
                            code: code.code.clone(),
                            discount_amount: amount,
                            remaining_uses: code.remaining_uses(),
                        },
                    );
                    let _ = client
                        .publish(reply, serde_json::to_vec(&response)?.into())
                        .await;
                }
                Err(rejection) => {
                    let error =
                        ErrorResponse::new(request.id, "VALIDATION_ERROR", rejection.to_string());
                    let _ = client
                        .publish(reply, serde_json::to_vec(&error)?.into())
                        .await;
                }
            },
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Promo code not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to look up promo code: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle promo.apply messages
pub async fn handle_apply(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
    limiter: Arc<RateLimiter>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received promo.apply message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ApplyPromoRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let user_id = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info.user_id,
            Err(_) => {
                let error =
                    ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        if !limiter.check_and_record(user_id) {
            warn!("Promo apply rate limit hit for user {}", user_id);
            let error = ErrorResponse::new(
                request.id,
                "RATE_LIMITED",
                "Too many promo attempts, try again later",
            );
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        match queries::promo::apply_code(&pool, &request.payload.code).await {
            Ok(ApplyOutcome::Applied(code)) => {
                info!("Promo code {} applied by user {}", code.code, user_id);
                let response = SuccessResponse::new(
                    request.id,
                    ApplyPromoResponse {
                        code: code.code.clone(),
                        remaining_uses: code.remaining_uses(),
                    },
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(ApplyOutcome::NotFound) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Promo code not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Ok(ApplyOutcome::Rejected(rejection)) => {
                let code = match rejection {
                    PromoRejection::Exhausted => "CONFLICT",
                    _ => "VALIDATION_ERROR",
                };
                let error = ErrorResponse::new(request.id, code, rejection.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to apply promo code: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle promo.create messages
pub async fn handle_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received promo.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreatePromoRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let auth_info = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info,
            Err(_) => {
                let error =
                    ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        if !auth_info.is_admin() {
            let error = ErrorResponse::new(request.id, "FORBIDDEN", "Admin role required");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        let payload = request.payload;

        if let Err(reason) = validate_promo_params(
            payload.discount_type,
            payload.value,
            payload.usage_limit,
            payload.starts_at <= payload.ends_at,
        ) {
            let error = ErrorResponse::new(request.id, "VALIDATION_ERROR", reason);
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        let code = payload
            .code
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| promo::generate_code(10));

        match queries::promo::create_code(
            &pool,
            &code,
            payload.discount_type,
            payload.value,
            payload.usage_limit,
            payload.starts_at,
            payload.ends_at,
        )
        .await
        {
            Ok(created) => {
                info!("Created promo code {}", created.code);
                let response = SuccessResponse::new(request.id, created);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) if is_unique_violation(&e) => {
                let error =
                    ErrorResponse::new(request.id, "CONFLICT", "Promo code already exists");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to create promo code: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle promo.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received promo.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ListRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let auth_info = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info,
            Err(_) => {
                let error =
                    ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        if !auth_info.is_admin() {
            let error = ErrorResponse::new(request.id, "FORBIDDEN", "Admin role required");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        let payload = request.payload;

        match queries::promo::list_codes(&pool, payload.limit, payload.offset).await {
            Ok((items, total)) => {
                let response = SuccessResponse::new(
                    request.id,
                    ListResponse {
                        items,
                        total,
                        limit: payload.limit,
                        offset: payload.offset,
                    },
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to list promo codes: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle promo.deactivate messages
pub async fn handle_deactivate(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received promo.deactivate message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<DeactivatePromoRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let auth_info = match auth::extract_auth(&request, &jwt_secret) {
            Ok(info) => info,
            Err(_) => {
                let error =
                    ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        if !auth_info.is_admin() {
            let error = ErrorResponse::new(request.id, "FORBIDDEN", "Admin role required");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        match queries::promo::deactivate(&pool, &request.payload.code).await {
            Ok(Some(code)) => {
                info!("Deactivated promo code {}", code.code);
                let response = SuccessResponse::new(request.id, code);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Promo code not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to deactivate promo code: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Shared parameter checks for promo creation (NATS and CLI paths)
pub fn validate_promo_params(
    discount_type: DiscountType,
    value: f64,
    usage_limit: i32,
    window_ordered: bool,
) -> Result<(), &'static str> {
    if value <= 0.0 {
        return Err("Discount value must be positive");
    }
    if discount_type == DiscountType::Percentage && value > 100.0 {
        return Err("Percentage discount cannot exceed 100");
    }
    if usage_limit < 1 {
        return Err("Usage limit must be at least 1");
    }
    if !window_ordered {
        return Err("Validity window start must not be after its end");
    }
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_promo_params_accepts_sane_input() {
        assert!(validate_promo_params(DiscountType::Percentage, 10.0, 100, true).is_ok());
        assert!(validate_promo_params(DiscountType::Fixed, 150.0, 1, true).is_ok());
    }

    #[test]
    fn test_validate_promo_params_rejects_bad_input() {
        assert!(validate_promo_params(DiscountType::Percentage, 0.0, 100, true).is_err());
        assert!(validate_promo_params(DiscountType::Percentage, 120.0, 100, true).is_err());
        assert!(validate_promo_params(DiscountType::Fixed, 50.0, 0, true).is_err());
        assert!(validate_promo_params(DiscountType::Fixed, 50.0, 10, false).is_err());
    }
}
