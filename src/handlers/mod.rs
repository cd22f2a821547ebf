//! NATS message handlers

pub mod booking;
pub mod catalog;
pub mod ping;
pub mod promo;
pub mod technician;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::services::rate_limiter::RateLimiter;

/// Promo endpoints allow this many attempts per user per window
const PROMO_RATE_LIMIT: usize = 10;
const PROMO_RATE_WINDOW_SECS: u64 = 60;

/// How often expired rate-limiter entries are swept
const PROMO_RATE_SWEEP_SECS: u64 = 300;

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let jwt_secret = Arc::new(config.jwt_secret.clone());
    let promo_limiter = Arc::new(RateLimiter::new(PROMO_RATE_LIMIT, PROMO_RATE_WINDOW_SECS));
    let radius_km = config.nearby_radius_km;

    // Sweep expired attempt entries out of the limiter's per-user map
    let limiter_sweep = Arc::clone(&promo_limiter);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(PROMO_RATE_SWEEP_SECS));
        loop {
            tick.tick().await;
            limiter_sweep.cleanup();
        }
    });

    // Subscribe to all subjects
    let ping_sub = client.subscribe("fixera.ping").await?;

    // Catalog subjects
    let category_list_sub = client.subscribe("fixera.catalog.category.list").await?;
    let category_create_sub = client.subscribe("fixera.catalog.category.create").await?;
    let category_update_sub = client.subscribe("fixera.catalog.category.update").await?;
    let category_delete_sub = client.subscribe("fixera.catalog.category.delete").await?;
    let service_list_sub = client.subscribe("fixera.catalog.service.list").await?;
    let service_create_sub = client.subscribe("fixera.catalog.service.create").await?;
    let service_update_sub = client.subscribe("fixera.catalog.service.update").await?;
    let service_delete_sub = client.subscribe("fixera.catalog.service.delete").await?;

    // Booking subjects
    let booking_create_sub = client.subscribe("fixera.booking.create").await?;
    let booking_list_sub = client.subscribe("fixera.booking.list").await?;
    let booking_get_sub = client.subscribe("fixera.booking.get").await?;
    let booking_cancel_sub = client.subscribe("fixera.booking.cancel").await?;

    // Technician subjects
    let profile_update_sub = client.subscribe("fixera.technician.profile.update").await?;
    let jobs_nearby_sub = client.subscribe("fixera.technician.jobs.nearby").await?;
    let jobs_accept_sub = client.subscribe("fixera.technician.jobs.accept").await?;
    let jobs_reject_sub = client.subscribe("fixera.technician.jobs.reject").await?;
    let jobs_complete_sub = client.subscribe("fixera.technician.jobs.complete").await?;
    let jobs_mine_sub = client.subscribe("fixera.technician.jobs.mine").await?;

    // Promo subjects
    let promo_validate_sub = client.subscribe("fixera.promo.validate").await?;
    let promo_apply_sub = client.subscribe("fixera.promo.apply").await?;
    let promo_create_sub = client.subscribe("fixera.promo.create").await?;
    let promo_list_sub = client.subscribe("fixera.promo.list").await?;
    let promo_deactivate_sub = client.subscribe("fixera.promo.deactivate").await?;

    info!("Subscribed to NATS subjects");

    // Clone for each handler
    let client_ping = client.clone();

    let client_category_list = client.clone();
    let client_category_create = client.clone();
    let client_category_update = client.clone();
    let client_category_delete = client.clone();
    let client_service_list = client.clone();
    let client_service_create = client.clone();
    let client_service_update = client.clone();
    let client_service_delete = client.clone();

    let client_booking_create = client.clone();
    let client_booking_list = client.clone();
    let client_booking_get = client.clone();
    let client_booking_cancel = client.clone();

    let client_profile_update = client.clone();
    let client_jobs_nearby = client.clone();
    let client_jobs_accept = client.clone();
    let client_jobs_reject = client.clone();
    let client_jobs_complete = client.clone();
    let client_jobs_mine = client.clone();

    let client_promo_validate = client.clone();
    let client_promo_apply = client.clone();
    let client_promo_create = client.clone();
    let client_promo_list = client.clone();
    let client_promo_deactivate = client.clone();

    let pool_category_list = pool.clone();
    let pool_category_create = pool.clone();
    let pool_category_update = pool.clone();
    let pool_category_delete = pool.clone();
    let pool_service_list = pool.clone();
    let pool_service_create = pool.clone();
    let pool_service_update = pool.clone();
    let pool_service_delete = pool.clone();

    let pool_booking_create = pool.clone();
    let pool_booking_list = pool.clone();
    let pool_booking_get = pool.clone();
    let pool_booking_cancel = pool.clone();

    let pool_profile_update = pool.clone();
    let pool_jobs_nearby = pool.clone();
    let pool_jobs_accept = pool.clone();
    let pool_jobs_reject = pool.clone();
    let pool_jobs_complete = pool.clone();
    let pool_jobs_mine = pool.clone();

    let pool_promo_validate = pool.clone();
    let pool_promo_apply = pool.clone();
    let pool_promo_create = pool.clone();
    let pool_promo_list = pool.clone();
    let pool_promo_deactivate = pool.clone();

    let jwt_category_list = Arc::clone(&jwt_secret);
    let jwt_category_create = Arc::clone(&jwt_secret);
    let jwt_category_update = Arc::clone(&jwt_secret);
    let jwt_category_delete = Arc::clone(&jwt_secret);
    let jwt_service_list = Arc::clone(&jwt_secret);
    let jwt_service_create = Arc::clone(&jwt_secret);
    let jwt_service_update = Arc::clone(&jwt_secret);
    let jwt_service_delete = Arc::clone(&jwt_secret);

    let jwt_booking_create = Arc::clone(&jwt_secret);
    let jwt_booking_list = Arc::clone(&jwt_secret);
    let jwt_booking_get = Arc::clone(&jwt_secret);
    let jwt_booking_cancel = Arc::clone(&jwt_secret);

    let jwt_profile_update = Arc::clone(&jwt_secret);
    let jwt_jobs_nearby = Arc::clone(&jwt_secret);
    let jwt_jobs_accept = Arc::clone(&jwt_secret);
    let jwt_jobs_reject = Arc::clone(&jwt_secret);
    let jwt_jobs_complete = Arc::clone(&jwt_secret);
    let jwt_jobs_mine = Arc::clone(&jwt_secret);

    let jwt_promo_validate = Arc::clone(&jwt_secret);
    let jwt_promo_apply = Arc::clone(&jwt_secret);
    let jwt_promo_create = Arc::clone(&jwt_secret);
    let jwt_promo_list = Arc::clone(&jwt_secret);
    let jwt_promo_deactivate = Arc::clone(&jwt_secret);

    let limiter_validate = Arc::clone(&promo_limiter);
    let limiter_apply = Arc::clone(&promo_limiter);

    // Spawn handlers
    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let category_list_handle = tokio::spawn(async move {
        catalog::handle_category_list(client_category_list, category_list_sub, pool_category_list, jwt_category_list).await
    });

    let category_create_handle = tokio::spawn(async move {
        catalog::handle_category_create(client_category_create, category_create_sub, pool_category_create, jwt_category_create).await
    });

    let category_update_handle = tokio::spawn(async move {
        catalog::handle_category_update(client_category_update, category_update_sub, pool_category_update, jwt_category_update).await
    });

    let category_delete_handle = tokio::spawn(async move {
        catalog::handle_category_delete(client_category_delete, category_delete_sub, pool_category_delete, jwt_category_delete).await
    });

    let service_list_handle = tokio::spawn(async move {
        catalog::handle_service_list(client_service_list, service_list_sub, pool_service_list, jwt_service_list).await
    });

    let service_create_handle = tokio::spawn(async move {
        catalog::handle_service_create(client_service_create, service_create_sub, pool_service_create, jwt_service_create).await
    });

    let service_update_handle = tokio::spawn(async move {
        catalog::handle_service_update(client_service_update, service_update_sub, pool_service_update, jwt_service_update).await
    });

    let service_delete_handle = tokio::spawn(async move {
        catalog::handle_service_delete(client_service_delete, service_delete_sub, pool_service_delete, jwt_service_delete).await
    });

    let booking_create_handle = tokio::spawn(async move {
        booking::handle_create(client_booking_create, booking_create_sub, pool_booking_create, jwt_booking_create).await
    });

    let booking_list_handle = tokio::spawn(async move {
        booking::handle_list(client_booking_list, booking_list_sub, pool_booking_list, jwt_booking_list).await
    });

    let booking_get_handle = tokio::spawn(async move {
        booking::handle_get(client_booking_get, booking_get_sub, pool_booking_get, jwt_booking_get).await
    });

    let booking_cancel_handle = tokio::spawn(async move {
        booking::handle_cancel(client_booking_cancel, booking_cancel_sub, pool_booking_cancel, jwt_booking_cancel).await
    });

    let profile_update_handle = tokio::spawn(async move {
        technician::handle_profile_update(client_profile_update, profile_update_sub, pool_profile_update, jwt_profile_update).await
    });

    let jobs_nearby_handle = tokio::spawn(async move {
        technician::handle_jobs_nearby(client_jobs_nearby, jobs_nearby_sub, pool_jobs_nearby, jwt_jobs_nearby, radius_km).await
    });

    let jobs_accept_handle = tokio::spawn(async move {
        technician::handle_accept(client_jobs_accept, jobs_accept_sub, pool_jobs_accept, jwt_jobs_accept).await
    });

    let jobs_reject_handle = tokio::spawn(async move {
        technician::handle_reject(client_jobs_reject, jobs_reject_sub, pool_jobs_reject, jwt_jobs_reject).await
    });

    let jobs_complete_handle = tokio::spawn(async move {
        technician::handle_complete(client_jobs_complete, jobs_complete_sub, pool_jobs_complete, jwt_jobs_complete).await
    });

    let jobs_mine_handle = tokio::spawn(async move {
        technician::handle_my_jobs(client_jobs_mine, jobs_mine_sub, pool_jobs_mine, jwt_jobs_mine).await
    });

    let promo_validate_handle = tokio::spawn(async move {
        promo::handle_validate(client_promo_validate, promo_validate_sub, pool_promo_validate, jwt_promo_validate, limiter_validate).await
    });

    let promo_apply_handle = tokio::spawn(async move {
        promo::handle_apply(client_promo_apply, promo_apply_sub, pool_promo_apply, jwt_promo_apply, limiter_apply).await
    });

    let promo_create_handle = tokio::spawn(async move {
        promo::handle_create(client_promo_create, promo_create_sub, pool_promo_create, jwt_promo_create).await
    });

    let promo_list_handle = tokio::spawn(async move {
        promo::handle_list(client_promo_list, promo_list_sub, pool_promo_list, jwt_promo_list).await
    });

    let promo_deactivate_handle = tokio::spawn(async move {
        promo::handle_deactivate(client_promo_deactivate, promo_deactivate_sub, pool_promo_deactivate, jwt_promo_deactivate).await
    });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which means an error occurred)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = category_list_handle => {
            error!("Category list handler finished: {:?}", result);
        }
        result = category_create_handle => {
            error!("Category create handler finished: {:?}", result);
        }
        result = category_update_handle => {
            error!("Category update handler finished: {:?}", result);
        }
        result = category_delete_handle => {
            error!("Category delete handler finished: {:?}", result);
        }
        result = service_list_handle => {
            error!("Service list handler finished: {:?}", result);
        }
        result = service_create_handle => {
            error!("Service create handler finished: {:?}", result);
        }
        result = service_update_handle => {
            error!("Service update handler finished: {:?}", result);
        }
        result = service_delete_handle => {
            error!("Service delete handler finished: {:?}", result);
        }
        result = booking_create_handle => {
            error!("Booking create handler finished: {:?}", result);
        }
        result = booking_list_handle => {
            error!("Booking list handler finished: {:?}", result);
        }
        result = booking_get_handle => {
            error!("Booking get handler finished: {:?}", result);
        }
        result = booking_cancel_handle => {
            error!("Booking cancel handler finished: {:?}", result);
        }
        result = profile_update_handle => {
            error!("Profile update handler finished: {:?}", result);
        }
        result = jobs_nearby_handle => {
            error!("Jobs nearby handler finished: {:?}", result);
        }
        result = jobs_accept_handle => {
            error!("Jobs accept handler finished: {:?}", result);
        }
        result = jobs_reject_handle => {
            error!("Jobs reject handler finished: {:?}", result);
        }
        result = jobs_complete_handle => {
            error!("Jobs complete handler finished: {:?}", result);
        }
        result = jobs_mine_handle => {
            error!("Jobs mine handler finished: {:?}", result);
        }
        result = promo_validate_handle => {
            error!("Promo validate handler finished: {:?}", result);
        }
        result = promo_apply_handle => {
            error!("Promo apply handler finished: {:?}", result);
        }
        result = promo_create_handle => {
            error!("Promo create handler finished: {:?}", result);
        }
        result = promo_list_handle => {
            error!("Promo list handler finished: {:?}", result);
        }
        result = promo_deactivate_handle => {
            error!("Promo deactivate handler finished: {:?}", result);
        }
    }

    Ok(())
}
