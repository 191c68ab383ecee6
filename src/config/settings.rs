use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub reconcile_interval_secs: u64,
    pub rate_refresh_interval_secs: u64,
    pub rate_lookup_timeout_secs: u64,
    pub max_retry_attempts: u32,
    pub sms_batch_size: u32,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "settlement.db".to_string());

        let reconcile_interval_secs = env::var("RECONCILE_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .unwrap_or(60);

        let rate_refresh_interval_secs = env::var("RATE_REFRESH_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()
            .unwrap_or(3600);

        let rate_lookup_timeout_secs = env::var("RATE_LOOKUP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .unwrap_or(10);

        let max_retry_attempts = env::var("MAX_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .unwrap_or(3);

        let sms_batch_size = env::var("SMS_BATCH_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<u32>()
            .unwrap_or(50);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Settings {
            database_url,
            reconcile_interval_secs,
            rate_refresh_interval_secs,
            rate_lookup_timeout_secs,
            max_retry_attempts,
            sms_batch_size,
            log_level,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(anyhow!("Reconcile interval must be greater than 0"));
        }
        if self.rate_lookup_timeout_secs == 0 {
            return Err(anyhow!("Rate lookup timeout must be greater than 0"));
        }
        if self.max_retry_attempts == 0 {
            return Err(anyhow!("Max retry attempts must be greater than 0"));
        }
        if self.sms_batch_size == 0 {
            return Err(anyhow!("SMS batch size must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "settlement.db".to_string(),
            reconcile_interval_secs: 60,
            rate_refresh_interval_secs: 3600,
            rate_lookup_timeout_secs: 10,
            max_retry_attempts: 3,
            sms_batch_size: 50,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let settings = Settings {
            sms_batch_size: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
