//! Catalog message handlers
//!
//! Listing is open to any authenticated caller; create/update/delete
//! require the admin role.

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth;
use crate::db::queries;
use crate::db::queries::catalog::DeleteOutcome;
use crate::types::{
    CatalogIdRequest, CatalogListRequest, CreateCategoryRequest, CreateServiceRequest,
    ErrorResponse, Request, SuccessResponse, UpdateCategoryRequest, UpdateServiceRequest,
};

/// Handle catalog.category.list messages
pub async fn handle_category_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.category.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CatalogListRequest> = match serde_json::from_slice(&msg.payload) {
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

        // Only admins may see inactive rows
        let include_inactive = request.payload.include_inactive && auth_info.is_admin();

        match queries::catalog::list_categories(&pool, include_inactive).await {
            Ok(categories) => {
                let response = SuccessResponse::new(request.id, categories);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to list categories: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.category.create messages
pub async fn handle_category_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.category.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateCategoryRequest> = match serde_json::from_slice(&msg.payload) {
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
        if payload.name.trim().is_empty() {
            let error =
                ErrorResponse::new(request.id, "VALIDATION_ERROR", "Category name is required");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        match queries::catalog::create_category(&pool, payload.name.trim(), payload.description.as_deref())
            .await
        {
            Ok(category) => {
                info!("Created category {} ({})", category.name, category.id);
                let response = SuccessResponse::new(request.id, category);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to create category: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.category.update messages
pub async fn handle_category_update(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.category.update message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<UpdateCategoryRequest> = match serde_json::from_slice(&msg.payload) {
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

        match queries::catalog::update_category(
            &pool,
            payload.id,
            payload.name.as_deref(),
            payload.description.as_deref(),
            payload.is_active,
        )
        .await
        {
            Ok(Some(category)) => {
                let response = SuccessResponse::new(request.id, category);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Category not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to update category: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.category.delete messages
pub async fn handle_category_delete(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.category.delete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CatalogIdRequest> = match serde_json::from_slice(&msg.payload) {
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

        match queries::catalog::delete_category(&pool, request.payload.id).await {
            Ok(DeleteOutcome::NotFound) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Category not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Ok(outcome) => {
                #[derive(serde::Serialize)]
                #[serde(rename_all = "camelCase")]
                struct DeleteResponse {
                    deleted: bool,
                    deactivated: bool,
                }
                let response = SuccessResponse::new(
                    request.id,
                    DeleteResponse {
                        deleted: outcome == DeleteOutcome::Deleted,
                        deactivated: outcome == DeleteOutcome::Deactivated,
                    },
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to delete category: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.service.list messages
pub async fn handle_service_list(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.service.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CatalogListRequest> = match serde_json::from_slice(&msg.payload) {
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

        let payload = request.payload;
        let include_inactive = payload.include_inactive && auth_info.is_admin();

        match queries::catalog::list_services(&pool, include_inactive, payload.category_id).await {
            Ok(services) => {
                let response = SuccessResponse::new(request.id, services);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to list services: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.service.create messages
pub async fn handle_service_create(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.service.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateServiceRequest> = match serde_json::from_slice(&msg.payload) {
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
        if payload.name.trim().is_empty() {
            let error =
                ErrorResponse::new(request.id, "VALIDATION_ERROR", "Service name is required");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }
        if payload.base_price < 0.0 {
            let error = ErrorResponse::new(
                request.id,
                "VALIDATION_ERROR",
                "Base price must not be negative",
            );
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        match queries::catalog::create_service(
            &pool,
            payload.category_id,
            payload.name.trim(),
            payload.description.as_deref(),
            payload.base_price,
            payload.duration_minutes.unwrap_or(60),
        )
        .await
        {
            Ok(service) => {
                info!("Created service {} ({})", service.name, service.id);
                let response = SuccessResponse::new(request.id, service);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to create service: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.service.update messages
pub async fn handle_service_update(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.service.update message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<UpdateServiceRequest> = match serde_json::from_slice(&msg.payload) {
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

        match queries::catalog::update_service(
            &pool,
            payload.id,
            payload.category_id,
            payload.name.as_deref(),
            payload.description.as_deref(),
            payload.base_price,
            payload.duration_minutes,
            payload.is_active,
        )
        .await
        {
            Ok(Some(service)) => {
                let response = SuccessResponse::new(request.id, service);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Service not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to update service: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle catalog.service.delete messages
pub async fn handle_service_delete(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.service.delete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CatalogIdRequest> = match serde_json::from_slice(&msg.payload) {
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

        match queries::catalog::delete_service(&pool, request.payload.id).await {
            Ok(DeleteOutcome::NotFound) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "Service not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Ok(outcome) => {
                #[derive(serde::Serialize)]
                #[serde(rename_all = "camelCase")]
                struct DeleteResponse {
                    deleted: bool,
                    deactivated: bool,
                }
                let response = SuccessResponse::new(
                    request.id,
                    DeleteResponse {
                        deleted: outcome == DeleteOutcome::Deleted,
                        deactivated: outcome == DeleteOutcome::Deactivated,
                    },
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to delete service: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}
