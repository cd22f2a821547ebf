//! Booking message handlers

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
use crate::services::promo::{discount_amount, PromoRejection};
use crate::types::{
    BookingIdRequest, CreateBookingRequest, ErrorResponse, ListRequest, ListResponse, Request,
    SuccessResponse,
};

/// Handle booking.create messages
pub async fn handle_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received booking.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateBookingRequest> = match serde_json::from_slice(&msg.payload) {
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

        let customer_id = match auth::extract_auth(&request, &jwt_secret) {
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

        let payload = request.payload;

        if payload.quantity < 1 {
            let error =
                ErrorResponse::new(request.id, "VALIDATION_ERROR", "Quantity must be at least 1");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }
        if payload.appointment_at <= Utc::now() {
            let error = ErrorResponse::new(
                request.id,
                "VALIDATION_ERROR",
                "Appointment must be in the future",
            );
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        let service = match queries::catalog::get_service(&pool, payload.service_id).await {
            Ok(Some(service)) if service.is_active => service,
            Ok(Some(_)) => {
                let error = ErrorResponse::new(
                    request.id,
                    "VALIDATION_ERROR",
                    "Service is not available for booking",
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Service not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
            Err(e) => {
                error!("Failed to load service: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let gross_total = service.base_price * payload.quantity as f64;

        // Consume the promo (guarded increment) before writing the request
        let mut discount: Option<f64> = None;
        let mut promo_code: Option<String> = None;
        if let Some(ref code) = payload.promo_code {
            match queries::promo::apply_code(&pool, code).await {
                Ok(ApplyOutcome::Applied(applied)) => {
                    discount = Some(discount_amount(
                        applied.discount_type,
                        applied.value,
                        gross_total,
                    ));
                    promo_code = Some(applied.code);
                }
                Ok(ApplyOutcome::NotFound) => {
                    let error =
                        ErrorResponse::new(request.id, "NOT_FOUND", "Promo code not found");
                    let _ = client
                        .publish(reply, serde_json::to_vec(&error)?.into())
                        .await;
                    continue;
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
                    continue;
                }
                Err(e) => {
                    error!("Failed to apply promo code: {}", e);
                    let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                    let _ = client
                        .publish(reply, serde_json::to_vec(&error)?.into())
                        .await;
                    continue;
                }
            }
        }

        let total_price = (gross_total - discount.unwrap_or(0.0)).max(0.0);

        match queries::booking::create_request(
            &pool,
            customer_id,
            service.id,
            payload.street.trim(),
            payload.city.trim(),
            payload.postal_code.trim(),
            payload.lat,
            payload.lng,
            payload.appointment_at,
            payload.quantity,
            total_price,
            promo_code.as_deref(),
            discount,
        )
        .await
        {
            Ok(booking) => {
                info!(
                    "Created booking {} for customer {} (total {:.2})",
                    booking.id, customer_id, booking.total_price
                );
                let response = SuccessResponse::new(request.id, booking);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                // The promo use, if any, is already consumed; this mirrors
                // the single-write-no-compensation contract
                error!("Failed to create booking: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle booking.list messages
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received booking.list message");

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

        let customer_id = match auth::extract_auth(&request, &jwt_secret) {
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

        let payload = request.payload;

        match queries::booking::list_requests_for_customer(
            &pool,
            customer_id,
            payload.limit,
            payload.offset,
        )
        .await
        {
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
                error!("Failed to list bookings: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle booking.get messages
pub async fn handle_get(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received booking.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<BookingIdRequest> = match serde_json::from_slice(&msg.payload) {
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

        let customer_id = match auth::extract_auth(&request, &jwt_secret) {
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

        match queries::booking::get_booking_detail(&pool, request.payload.id, customer_id).await {
            Ok(Some(detail)) => {
                let response = SuccessResponse::new(request.id, detail);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Booking not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to get booking: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle booking.cancel messages
pub async fn handle_cancel(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received booking.cancel message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<BookingIdRequest> = match serde_json::from_slice(&msg.payload) {
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

        let customer_id = match auth::extract_auth(&request, &jwt_secret) {
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

        let booking_id = request.payload.id;

        match queries::booking::cancel_request(&pool, booking_id, customer_id).await {
            Ok(Some(booking)) => {
                info!("Cancelled booking {}", booking.id);
                let response = SuccessResponse::new(request.id, booking);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                // The guard matched nothing — missing, someone else's, or
                // already claimed
                let error = match queries::booking::get_request_for_customer(
                    &pool,
                    booking_id,
                    customer_id,
                )
                .await
                {
                    Ok(Some(existing)) => ErrorResponse::new(
                        request.id,
                        "CONFLICT",
                        format!(
                            "Booking can no longer be cancelled (status: {})",
                            existing.status.as_str()
                        ),
                    ),
                    Ok(None) => {
                        ErrorResponse::new(request.id, "NOT_FOUND", "Booking not found")
                    }
                    Err(e) => {
                        error!("Failed to classify cancel failure: {}", e);
                        ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string())
                    }
                };
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to cancel booking: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}
