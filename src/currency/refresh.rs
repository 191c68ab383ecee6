use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use rust_decimal::Decimal;

use crate::currency::{Currency, CurrencyConverter};
use crate::error::{Result, SettlementError};
use crate::retry::{retry_with_backoff, RetryConfig};

/// External rate provider. The real implementation lives with the
/// rate collaborator; tests and the default wiring use a fixed source.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self) -> Result<Vec<(Currency, Currency, Decimal)>>;
}

/// Serves the operational default rates; stands in until a live
/// provider is wired up.
pub struct StaticRateSource {
    rates: Vec<(Currency, Currency, Decimal)>,
}

impl StaticRateSource {
    pub fn new(rates: Vec<(Currency, Currency, Decimal)>) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch_rates(&self) -> Result<Vec<(Currency, Currency, Decimal)>> {
        Ok(self.rates.clone())
    }
}

/// Pull rates once with a bounded timeout and bounded retries. Timeouts
/// surface as retryable errors; they never mutate the cache.
pub async fn refresh_rates(
    converter: &CurrencyConverter,
    source: &dyn RateSource,
    timeout: Duration,
) -> Result<usize> {
    let rates = retry_with_backoff(
        || async {
            tokio::time::timeout(timeout, source.fetch_rates())
                .await
                .map_err(|_| {
                    SettlementError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "rate lookup timed out",
                    ))
                })?
        },
        RetryConfig::default(),
        "rate_refresh",
    )
    .await?;

    let count = rates.len();
    for (from, to, rate) in rates {
        converter.set_rate(from, to, rate).await?;
    }
    info!("Refreshed {} exchange rates", count);
    Ok(count)
}

/// Periodic refresh loop; runs until the task is aborted.
pub async fn run_rate_refresh(
    converter: CurrencyConverter,
    source: Box<dyn RateSource>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Err(err) = refresh_rates(&converter, source.as_ref(), timeout).await {
            warn!("Rate refresh failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn refresh_populates_the_cache() {
        let converter = CurrencyConverter::new();
        let source = StaticRateSource::new(vec![(Currency::Cny, Currency::Vnd, dec!(3600))]);
        let count = refresh_rates(&converter, &source, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
        let rate = converter.rate(Currency::Cny, Currency::Vnd).await.unwrap();
        assert_eq!(rate, dec!(3600));
    }

    struct FailingSource;

    #[async_trait]
    impl RateSource for FailingSource {
        async fn fetch_rates(&self) -> Result<Vec<(Currency, Currency, Decimal)>> {
            Err(SettlementError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "provider down",
            )))
        }
    }

    #[tokio::test]
    async fn failed_refresh_leaves_cache_untouched() {
        let converter = CurrencyConverter::new();
        let result = refresh_rates(&converter, &FailingSource, Duration::from_secs(1)).await;
        assert!(result.is_err());
        assert!(converter
            .rate(Currency::Cny, Currency::Vnd)
            .await
            .is_err());
    }
}
