//! Technician message handlers: profile, nearby jobs, and the
//! accept / reject / complete lifecycle.

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{self, AuthInfo};
use crate::db::queries;
use crate::db::queries::assignment::{ClaimOutcome, CompleteOutcome};
use crate::services::geo;
use crate::types::{
    Coordinates, ErrorResponse, JobActionRequest, NearbyJobsRequest, NearbyJobsResponse, Request,
    SuccessResponse, TechnicianProfile, UpdateProfileRequest,
};

/// Why the caller may not act as a technician
enum TechnicianGate {
    NotTechnician,
    NoProfile,
    Inactive,
}

impl TechnicianGate {
    fn to_error(&self, request_id: Uuid) -> ErrorResponse {
        match self {
            TechnicianGate::NotTechnician => {
                ErrorResponse::new(request_id, "FORBIDDEN", "Technician role required")
            }
            TechnicianGate::NoProfile => {
                ErrorResponse::new(request_id, "FORBIDDEN", "No technician profile")
            }
            TechnicianGate::Inactive => {
                ErrorResponse::new(request_id, "FORBIDDEN", "Technician profile is inactive")
            }
        }
    }
}

/// Load the caller's profile and require it to be active.
async fn active_profile(
    pool: &PgPool,
    auth_info: &AuthInfo,
) -> Result<Result<TechnicianProfile, TechnicianGate>> {
    if !auth_info.is_technician() {
        return Ok(Err(TechnicianGate::NotTechnician));
    }
    let profile = queries::technician::get_profile(pool, auth_info.user_id).await?;
    Ok(match profile {
        None => Err(TechnicianGate::NoProfile),
        Some(p) if !p.is_active => Err(TechnicianGate::Inactive),
        Some(p) => Ok(p),
    })
}

/// Handle technician.profile.update messages
pub async fn handle_profile_update(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received technician.profile.update message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<UpdateProfileRequest> = match serde_json::from_slice(&msg.payload) {
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

        if !auth_info.is_technician() {
            let error = ErrorResponse::new(request.id, "FORBIDDEN", "Technician role required");
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        let payload = request.payload;

        // Coordinates travel as a pair
        if payload.lat.is_some() != payload.lng.is_some() {
            let error = ErrorResponse::new(
                request.id,
                "VALIDATION_ERROR",
                "lat and lng must be provided together",
            );
            let _ = client
                .publish(reply, serde_json::to_vec(&error)?.into())
                .await;
            continue;
        }

        match queries::technician::upsert_profile(
            &pool,
            auth_info.user_id,
            payload.display_name.as_deref(),
            payload.is_active,
            payload.lat,
            payload.lng,
            payload.capability_ids.as_deref(),
        )
        .await
        {
            Ok(profile) => {
                debug!("Updated technician profile {}", profile.user_id);
                let response = SuccessResponse::new(request.id, profile);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to update technician profile: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle technician.jobs.nearby messages
pub async fn handle_jobs_nearby(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
    radius_km: f64,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received technician.jobs.nearby message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<NearbyJobsRequest> = match serde_json::from_slice(&msg.payload) {
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

        let profile = match active_profile(&pool, &auth_info).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(gate)) => {
                let _ = client
                    .publish(reply, serde_json::to_vec(&gate.to_error(request.id))?.into())
                    .await;
                continue;
            }
            Err(e) => {
                error!("Failed to load technician profile: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        // Explicit coordinates win over the stored position
        let payload = request.payload;
        let origin = match (payload.lat, payload.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => profile.coordinates(),
        };
        let origin = match origin {
            Some(origin) => origin,
            None => {
                let error = ErrorResponse::new(
                    request.id,
                    "VALIDATION_ERROR",
                    "No coordinates in payload or profile",
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        match queries::technician::nearby_candidates(&pool, &profile.capability_ids).await {
            Ok(candidates) => {
                let jobs = geo::filter_nearby(&origin, candidates, radius_km);
                debug!("Nearby jobs for {}: {}", profile.user_id, jobs.len());
                let response =
                    SuccessResponse::new(request.id, NearbyJobsResponse { jobs, radius_km });
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to query nearby candidates: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle technician.jobs.accept messages
pub async fn handle_accept(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received technician.jobs.accept message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<JobActionRequest> = match serde_json::from_slice(&msg.payload) {
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

        let profile = match active_profile(&pool, &auth_info).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(gate)) => {
                let _ = client
                    .publish(reply, serde_json::to_vec(&gate.to_error(request.id))?.into())
                    .await;
                continue;
            }
            Err(e) => {
                error!("Failed to load technician profile: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let request_id = request.payload.service_request_id;

        match queries::assignment::accept_job(&pool, request_id, profile.user_id).await {
            Ok(ClaimOutcome::Claimed(assignment)) => {
                info!(
                    "Technician {} accepted request {}",
                    profile.user_id, request_id
                );
                let response = SuccessResponse::new(request.id, assignment);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(ClaimOutcome::NotFound) => {
                let error =
                    ErrorResponse::new(request.id, "NOT_FOUND", "Service request not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Ok(ClaimOutcome::NotClaimable(status)) => {
                let error = ErrorResponse::new(
                    request.id,
                    "CONFLICT",
                    format!("Job is no longer available (status: {})", status.as_str()),
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to accept job: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle technician.jobs.reject messages
pub async fn handle_reject(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received technician.jobs.reject message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<JobActionRequest> = match serde_json::from_slice(&msg.payload) {
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

        let profile = match active_profile(&pool, &auth_info).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(gate)) => {
                let _ = client
                    .publish(reply, serde_json::to_vec(&gate.to_error(request.id))?.into())
                    .await;
                continue;
            }
            Err(e) => {
                error!("Failed to load technician profile: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let request_id = request.payload.service_request_id;

        match queries::assignment::reject_job(&pool, request_id, profile.user_id).await {
            Ok(Some(assignment)) => {
                debug!(
                    "Technician {} rejected request {}",
                    profile.user_id, request_id
                );
                let response = SuccessResponse::new(request.id, assignment);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                let error =
                    ErrorResponse::new(request.id, "NOT_FOUND", "Service request not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to reject job: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle technician.jobs.complete messages
pub async fn handle_complete(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received technician.jobs.complete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<JobActionRequest> = match serde_json::from_slice(&msg.payload) {
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

        let profile = match active_profile(&pool, &auth_info).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(gate)) => {
                let _ = client
                    .publish(reply, serde_json::to_vec(&gate.to_error(request.id))?.into())
                    .await;
                continue;
            }
            Err(e) => {
                error!("Failed to load technician profile: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        let request_id = request.payload.service_request_id;

        match queries::assignment::complete_job(&pool, request_id, profile.user_id).await {
            Ok(CompleteOutcome::Completed(completed)) => {
                info!(
                    "Technician {} completed request {}",
                    profile.user_id, request_id
                );
                let response = SuccessResponse::new(request.id, completed);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(CompleteOutcome::NotAssigned) => {
                let error = ErrorResponse::new(
                    request.id,
                    "FORBIDDEN",
                    "You do not hold the assignment for this job",
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Ok(CompleteOutcome::WrongStatus(status)) => {
                let error = ErrorResponse::new(
                    request.id,
                    "VALIDATION_ERROR",
                    format!("Job is not in progress (status: {})", status.as_str()),
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Ok(CompleteOutcome::NotFound) => {
                let error =
                    ErrorResponse::new(request.id, "NOT_FOUND", "Service request not found");
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to complete job: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}

/// Handle technician.jobs.mine messages
pub async fn handle_my_jobs(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    jwt_secret: Arc<String>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received technician.jobs.mine message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<crate::types::EmptyPayload> = match serde_json::from_slice(&msg.payload)
        {
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

        let profile = match active_profile(&pool, &auth_info).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(gate)) => {
                let _ = client
                    .publish(reply, serde_json::to_vec(&gate.to_error(request.id))?.into())
                    .await;
                continue;
            }
            Err(e) => {
                error!("Failed to load technician profile: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
                continue;
            }
        };

        match queries::assignment::list_accepted_jobs(&pool, profile.user_id).await {
            Ok(jobs) => {
                let response = SuccessResponse::new(request.id, jobs);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                error!("Failed to list accepted jobs: {}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client
                    .publish(reply, serde_json::to_vec(&error)?.into())
                    .await;
            }
        }
    }

    Ok(())
}
