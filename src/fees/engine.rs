use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::currency::converter::round_to_unit;
use crate::currency::{Currency, CurrencyConverter};
use crate::error::Result;
use crate::fees::tiers::{
    tier_for_quantity, PackagingRates, ACCESSORY_PRICE_THRESHOLD, BUBBLE_WRAP, REFERENCE_CURRENCY,
    WOODEN_PACKAGING,
};

/// One order line as the fee engine sees it: the snapshot price in its
/// listing currency plus the quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeLine {
    pub unit_price: Decimal,
    pub currency: Currency,
    pub quantity: u32,
}

/// Which optional services the caller wants billed. Each one is strictly
/// additive and independently toggle-able.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AdditionalServices {
    pub item_count_check: bool,
    pub wooden_packaging: bool,
    pub bubble_wrap: bool,
}

/// Pure, config-driven fee computations. All monetary outputs are in the
/// settlement currency, rounded half-up to its smallest unit; any missing
/// exchange rate aborts the calculation.
#[derive(Clone)]
pub struct FeeCalculationEngine {
    converter: CurrencyConverter,
}

impl FeeCalculationEngine {
    pub fn new(converter: CurrencyConverter) -> Self {
        Self { converter }
    }

    /// Service fee: product cost × percent / 100, in VND.
    pub fn service_fee(product_cost: Decimal, service_percent: Decimal) -> Decimal {
        round_to_unit(product_cost * service_percent / dec!(100), Currency::Vnd)
    }

    /// Item-count-check fee. Each line is classified regular or accessory
    /// by converting its own unit price into the reference currency; the
    /// conversion happens per item, not on an order-level average, so a
    /// mixed-price order can land in both classes.
    pub async fn item_count_check_fee(&self, lines: &[FeeLine]) -> Result<Decimal> {
        let mut regular_qty: u32 = 0;
        let mut accessory_qty: u32 = 0;

        for line in lines {
            let reference_price = self
                .converter
                .convert(line.unit_price, line.currency, REFERENCE_CURRENCY)
                .await?;
            if reference_price < ACCESSORY_PRICE_THRESHOLD {
                accessory_qty += line.quantity;
            } else {
                regular_qty += line.quantity;
            }
        }
        debug!(
            "Item count check: {} regular, {} accessory",
            regular_qty, accessory_qty
        );

        let mut fee = Decimal::ZERO;
        if let Some(tier) = tier_for_quantity(regular_qty) {
            fee += tier.regular_rate * Decimal::from(regular_qty);
        }
        if let Some(tier) = tier_for_quantity(accessory_qty) {
            fee += tier.accessory_rate * Decimal::from(accessory_qty);
        }
        Ok(round_to_unit(fee, Currency::Vnd))
    }

    /// Wooden crate packaging fee for a total shipment weight in kg.
    pub async fn wooden_packaging_fee(&self, weight_kg: Decimal) -> Result<Decimal> {
        self.packaging_fee(weight_kg, WOODEN_PACKAGING).await
    }

    /// Bubble wrap fee for a total shipment weight in kg.
    pub async fn bubble_wrap_fee(&self, weight_kg: Decimal) -> Result<Decimal> {
        self.packaging_fee(weight_kg, BUBBLE_WRAP).await
    }

    /// First kilogram at the base rate, every kilogram above that at the
    /// additional rate. Priced in CNY, settled in VND.
    async fn packaging_fee(&self, weight_kg: Decimal, rates: PackagingRates) -> Result<Decimal> {
        let extra = (weight_kg - Decimal::ONE).max(Decimal::ZERO);
        let fee_cny = rates.first_kg + extra * rates.additional_kg;
        self.converter
            .convert_rounded(fee_cny, Currency::Cny, Currency::Vnd)
            .await
    }

    /// Sum of whichever optional services were requested.
    pub async fn additional_services_fee(
        &self,
        lines: &[FeeLine],
        weight_kg: Decimal,
        services: AdditionalServices,
    ) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        if services.item_count_check {
            total += self.item_count_check_fee(lines).await?;
        }
        if services.wooden_packaging {
            total += self.wooden_packaging_fee(weight_kg).await?;
        }
        if services.bubble_wrap {
            total += self.bubble_wrap_fee(weight_kg).await?;
        }
        Ok(round_to_unit(total, Currency::Vnd))
    }
}
