use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, SettlementError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Settlement currency, no sub-unit.
    Vnd,
    /// Source marketplace currency; also the reference currency for
    /// price-threshold checks.
    Cny,
    /// Secondary listing currency.
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Vnd => "VND",
            Self::Cny => "CNY",
            Self::Usd => "USD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VND" => Some(Self::Vnd),
            "CNY" | "RMB" => Some(Self::Cny),
            "USD" => Some(Self::Usd),
            _ => None,
        }
    }

    /// Decimal places of the smallest unit.
    pub fn scale(&self) -> u32 {
        match self {
            Self::Vnd => 0,
            Self::Cny | Self::Usd => 2,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Round half-up to the currency's smallest unit.
pub fn round_to_unit(amount: Decimal, currency: Currency) -> Decimal {
    amount.round_dp_with_strategy(currency.scale(), RoundingStrategy::MidpointAwayFromZero)
}

/// In-memory exchange rate cache. Seeded at startup, refreshed by a
/// periodic job, and overridable by an admin action. A missing rate is a
/// hard error; conversion never falls back to 1:1.
#[derive(Clone)]
pub struct CurrencyConverter {
    rates: Arc<RwLock<HashMap<(Currency, Currency), Decimal>>>,
}

impl CurrencyConverter {
    pub fn new() -> Self {
        Self {
            rates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Converter pre-loaded with the operational defaults. Real rates are
    /// pushed over these by the refresh job or an admin override.
    pub fn with_default_rates() -> Self {
        let converter = Self::new();
        {
            let mut rates = converter
                .rates
                .try_write()
                .expect("no other handle exists yet");
            rates.insert((Currency::Cny, Currency::Vnd), dec!(3500));
            rates.insert((Currency::Usd, Currency::Vnd), dec!(25000));
            rates.insert((Currency::Usd, Currency::Cny), dec!(7.2));
        }
        converter
    }

    pub async fn set_rate(&self, from: Currency, to: Currency, rate: Decimal) -> Result<()> {
        if rate <= Decimal::ZERO {
            return Err(SettlementError::invalid_amount(rate));
        }
        let mut rates = self.rates.write().await;
        rates.insert((from, to), rate);
        info!("Exchange rate set: {} -> {} = {}", from, to, rate);
        Ok(())
    }

    pub async fn rate(&self, from: Currency, to: Currency) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let rates = self.rates.read().await;
        if let Some(rate) = rates.get(&(from, to)) {
            return Ok(*rate);
        }
        // Derive the reverse direction when only one is stored.
        if let Some(rate) = rates.get(&(to, from)) {
            if !rate.is_zero() {
                return Ok(Decimal::ONE / *rate);
            }
        }
        warn!("No exchange rate available for {} -> {}", from, to);
        Err(SettlementError::rate_unavailable(from.code(), to.code()))
    }

    pub async fn convert(&self, amount: Decimal, from: Currency, to: Currency) -> Result<Decimal> {
        let rate = self.rate(from, to).await?;
        let converted = amount * rate;
        debug!("Converted {} {} -> {} {}", amount, from, converted, to);
        Ok(converted)
    }

    /// Convert and round to the target currency's smallest unit.
    pub async fn convert_rounded(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
    ) -> Result<Decimal> {
        let converted = self.convert(amount, from, to).await?;
        Ok(round_to_unit(converted, to))
    }

    pub async fn snapshot(&self) -> HashMap<(Currency, Currency), Decimal> {
        self.rates.read().await.clone()
    }
}

impl Default for CurrencyConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn convert_uses_stored_rate() {
        let converter = CurrencyConverter::new();
        converter
            .set_rate(Currency::Cny, Currency::Vnd, dec!(3500))
            .await
            .unwrap();
        let vnd = converter
            .convert(dec!(10), Currency::Cny, Currency::Vnd)
            .await
            .unwrap();
        assert_eq!(vnd, dec!(35000));
    }

    #[tokio::test]
    async fn missing_rate_fails_loudly() {
        let converter = CurrencyConverter::new();
        let err = converter
            .convert(dec!(10), Currency::Cny, Currency::Vnd)
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::RateUnavailable { .. }));
    }

    #[tokio::test]
    async fn reverse_rate_is_derived() {
        let converter = CurrencyConverter::new();
        converter
            .set_rate(Currency::Usd, Currency::Cny, dec!(8))
            .await
            .unwrap();
        let usd = converter
            .convert(dec!(16), Currency::Cny, Currency::Usd)
            .await
            .unwrap();
        assert_eq!(usd, dec!(2));
    }

    #[tokio::test]
    async fn identity_conversion_needs_no_rate() {
        let converter = CurrencyConverter::new();
        let out = converter
            .convert(dec!(123.45), Currency::Usd, Currency::Usd)
            .await
            .unwrap();
        assert_eq!(out, dec!(123.45));
    }

    #[tokio::test]
    async fn rejects_non_positive_rate() {
        let converter = CurrencyConverter::new();
        let err = converter
            .set_rate(Currency::Cny, Currency::Vnd, dec!(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidAmount { .. }));
    }

    #[test]
    fn rounding_is_half_up_per_currency() {
        assert_eq!(round_to_unit(dec!(1000.5), Currency::Vnd), dec!(1001));
        assert_eq!(round_to_unit(dec!(1000.4), Currency::Vnd), dec!(1000));
        assert_eq!(round_to_unit(dec!(10.005), Currency::Cny), dec!(10.01));
    }
}
