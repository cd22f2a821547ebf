//! Fixera Worker - Backend service for the home-services marketplace
//!
//! Connects to NATS and serves catalog, booking, technician job, and
//! promo-code requests backed by PostgreSQL.

mod auth;
mod cli;
mod config;
mod db;
mod handlers;
mod services;
mod types;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use types::DiscountType;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,fixera_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        ) // file
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    match args.command {
        Some(Command::Migrate) => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(&pool).await?;
            return Ok(());
        }
        Some(Command::CreatePromo {
            code,
            discount_type,
            value,
            usage_limit,
            valid_days,
        }) => {
            let discount_type = match discount_type.as_str() {
                "percentage" => DiscountType::Percentage,
                _ => DiscountType::Fixed,
            };
            let starts_at = Utc::now();
            let ends_at = starts_at + Duration::days(valid_days);

            if let Err(reason) = handlers::promo::validate_promo_params(
                discount_type,
                value,
                usage_limit,
                starts_at <= ends_at,
            ) {
                anyhow::bail!("Invalid promo parameters: {reason}");
            }

            let code = code
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| services::promo::generate_code(10));

            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(&pool).await?;

            let created = db::queries::promo::create_code(
                &pool,
                &code,
                discount_type,
                value,
                usage_limit,
                starts_at,
                ends_at,
            )
            .await?;

            info!(
                "Created promo code {} (valid until {})",
                created.code, created.ends_at
            );
            println!("{}", created.code);
            return Ok(());
        }
        Some(Command::Serve) | None => {}
    }

    info!("Starting Fixera Worker...");

    // Connect to database
    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db::run_migrations(&pool).await?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    // Start message handlers
    if let Err(e) = handlers::start_handlers(nats_client, pool, &config).await {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}
