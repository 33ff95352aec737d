use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    /// How long one offer wave waits for a captain to accept.
    pub offer_deadline: Duration,
    /// Captains whose last ping is older than this are excluded from matching.
    pub presence_freshness: Duration,
    pub search_radius_km: f64,
    pub radius_growth_factor: f64,
    pub max_search_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_deadline: Duration::from_millis(parse_or_default("OFFER_DEADLINE_MS", 15_000)?),
            presence_freshness: Duration::from_millis(parse_or_default(
                "PRESENCE_FRESHNESS_MS",
                30_000,
            )?),
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 5.0)?,
            radius_growth_factor: parse_or_default("RADIUS_GROWTH_FACTOR", 2.0)?,
            max_search_attempts: parse_or_default("MAX_SEARCH_ATTEMPTS", 3)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
