use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub lead_timeout_secs: u64,
    pub notification_cap: usize,
    pub eta_min_minutes: u32,
    pub eta_max_minutes: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            lead_timeout_secs: parse_or_default("LEAD_TIMEOUT_SECS", 30)?,
            notification_cap: parse_or_default("NOTIFICATION_CAP", 25)?,
            eta_min_minutes: parse_or_default("ETA_MIN_MINUTES", 10)?,
            eta_max_minutes: parse_or_default("ETA_MAX_MINUTES", 45)?,
        };

        if config.eta_min_minutes > config.eta_max_minutes {
            return Err(AppError::Internal(format!(
                "ETA_MIN_MINUTES ({}) exceeds ETA_MAX_MINUTES ({})",
                config.eta_min_minutes, config.eta_max_minutes
            )));
        }

        Ok(config)
    }

    pub fn eta_range(&self) -> (u32, u32) {
        (self.eta_min_minutes, self.eta_max_minutes)
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
