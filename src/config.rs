//! Configuration management

use anyhow::{self, Context, Result};

/// Default radius for the nearby-jobs filter, in kilometers
const DEFAULT_NEARBY_RADIUS_KM: f64 = 10.0;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// JWT secret key for token validation
    pub jwt_secret: String,

    /// Radius for the nearby-jobs filter, in kilometers
    pub nearby_radius_km: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set — generate one with: openssl rand -base64 48")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
                jwt_secret.len()
            );
        }

        let nearby_radius_km = match std::env::var("NEARBY_RADIUS_KM") {
            Ok(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("NEARBY_RADIUS_KM is not a number: {raw}"))?,
            Err(_) => DEFAULT_NEARBY_RADIUS_KM,
        };

        if nearby_radius_km <= 0.0 {
            anyhow::bail!("NEARBY_RADIUS_KM must be positive");
        }

        Ok(Self {
            nats_url,
            database_url,
            jwt_secret,
            nearby_radius_km,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-that-is-long-enough-123456";

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_radius_defaults_to_ten_km() {
        std::env::remove_var("NEARBY_RADIUS_KM");
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("JWT_SECRET", SECRET);

        let config = Config::from_env().unwrap();
        assert!((config.nearby_radius_km - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_radius_override() {
        std::env::set_var("NEARBY_RADIUS_KM", "25.5");
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("JWT_SECRET", SECRET);

        let config = Config::from_env().unwrap();
        assert!((config.nearby_radius_km - 25.5).abs() < f64::EPSILON);

        std::env::remove_var("NEARBY_RADIUS_KM");
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_rejects_short_jwt_secret() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("JWT_SECRET", "too-short");

        assert!(Config::from_env().is_err());

        std::env::set_var("JWT_SECRET", SECRET);
    }
}
