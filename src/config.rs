// Application configuration
// Read from the environment after `.env` has been loaded

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

use crate::booking_rules::{
    error::{BRResult, BookingRulesError},
    loyalty::LoyaltyConfig,
    notifications::DEFAULT_MAX_ATTEMPTS,
};

/// Runtime configuration for the API server
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding one JSON file per collection; in-memory when unset
    pub data_dir: Option<PathBuf>,
    pub loyalty: LoyaltyConfig,
    pub notification_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: None,
            loyalty: LoyaltyConfig::default(),
            notification_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables
    pub fn from_env() -> BRResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    ///
    /// Missing keys fall back to defaults; present but malformed values are
    /// an error.
    pub fn from_lookup<F>(lookup: F) -> BRResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            data_dir: lookup("DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            loyalty: LoyaltyConfig {
                silver_threshold: parse_or(
                    &lookup,
                    "LOYALTY_SILVER_THRESHOLD",
                    defaults.loyalty.silver_threshold,
                )?,
                gold_threshold: parse_or(
                    &lookup,
                    "LOYALTY_GOLD_THRESHOLD",
                    defaults.loyalty.gold_threshold,
                )?,
                platinum_threshold: parse_or(
                    &lookup,
                    "LOYALTY_PLATINUM_THRESHOLD",
                    defaults.loyalty.platinum_threshold,
                )?,
                points_per_unit: parse_or::<Decimal, _>(
                    &lookup,
                    "LOYALTY_POINTS_PER_UNIT",
                    defaults.loyalty.points_per_unit,
                )?,
                points_expiry_days: parse_or(
                    &lookup,
                    "LOYALTY_POINTS_EXPIRY_DAYS",
                    defaults.loyalty.points_expiry_days,
                )?,
            },
            notification_max_attempts: parse_or(
                &lookup,
                "NOTIFICATION_MAX_ATTEMPTS",
                defaults.notification_max_attempts,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BRResult<()> {
        self.loyalty.validate()?;
        if self.notification_max_attempts == 0 {
            return Err(BookingRulesError::InvalidConfiguration(
                "NOTIFICATION_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> BRResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            BookingRulesError::InvalidConfiguration(format!("{} has invalid value '{}'", key, raw))
        }),
    }
}
