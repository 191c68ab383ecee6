use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::currency::Currency;

/// Unit-price threshold in the reference currency below which a line is
/// billed as an accessory.
pub const ACCESSORY_PRICE_THRESHOLD: Decimal = dec!(10);
pub const REFERENCE_CURRENCY: Currency = Currency::Cny;

/// Quantity bracket with per-item rates in VND. The rate for a class is
/// picked by the class's total quantity and applied to every item in it.
#[derive(Debug, Clone, Copy)]
pub struct QuantityTier {
    pub min_quantity: u32,
    /// Inclusive upper bound; `None` for the open-ended top bracket.
    pub max_quantity: Option<u32>,
    pub regular_rate: Decimal,
    pub accessory_rate: Decimal,
}

/// Item-count-check rates. Accessory rates sit below regular rates in
/// every bracket, and per-item rates fall as quantity grows.
pub const ITEM_COUNT_TIERS: [QuantityTier; 5] = [
    QuantityTier {
        min_quantity: 1,
        max_quantity: Some(5),
        regular_rate: dec!(5000),
        accessory_rate: dec!(3000),
    },
    QuantityTier {
        min_quantity: 6,
        max_quantity: Some(20),
        regular_rate: dec!(4000),
        accessory_rate: dec!(2500),
    },
    QuantityTier {
        min_quantity: 21,
        max_quantity: Some(100),
        regular_rate: dec!(3000),
        accessory_rate: dec!(2000),
    },
    QuantityTier {
        min_quantity: 101,
        max_quantity: Some(500),
        regular_rate: dec!(2000),
        accessory_rate: dec!(1500),
    },
    QuantityTier {
        min_quantity: 501,
        max_quantity: None,
        regular_rate: dec!(1000),
        accessory_rate: dec!(800),
    },
];

/// Find the bracket a quantity falls into. Returns `None` for zero.
pub fn tier_for_quantity(quantity: u32) -> Option<&'static QuantityTier> {
    if quantity == 0 {
        return None;
    }
    ITEM_COUNT_TIERS.iter().find(|tier| {
        quantity >= tier.min_quantity
            && tier.max_quantity.map_or(true, |max| quantity <= max)
    })
}

/// Packaging fee schedule in the source marketplace currency (CNY):
/// a first-kilogram rate plus a per-kilogram rate for the rest.
#[derive(Debug, Clone, Copy)]
pub struct PackagingRates {
    pub first_kg: Decimal,
    pub additional_kg: Decimal,
}

pub const WOODEN_PACKAGING: PackagingRates = PackagingRates {
    first_kg: dec!(50),
    additional_kg: dec!(15),
};

pub const BUBBLE_WRAP: PackagingRates = PackagingRates {
    first_kg: dec!(10),
    additional_kg: dec!(5),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(tier_for_quantity(1).unwrap().min_quantity, 1);
        assert_eq!(tier_for_quantity(5).unwrap().max_quantity, Some(5));
        assert_eq!(tier_for_quantity(6).unwrap().min_quantity, 6);
        assert_eq!(tier_for_quantity(20).unwrap().min_quantity, 6);
        assert_eq!(tier_for_quantity(21).unwrap().min_quantity, 21);
        assert_eq!(tier_for_quantity(500).unwrap().min_quantity, 101);
        assert_eq!(tier_for_quantity(501).unwrap().min_quantity, 501);
        assert_eq!(tier_for_quantity(10_000).unwrap().min_quantity, 501);
        assert!(tier_for_quantity(0).is_none());
    }

    #[test]
    fn accessory_rates_always_below_regular() {
        for tier in &ITEM_COUNT_TIERS {
            assert!(tier.accessory_rate < tier.regular_rate);
        }
    }

    #[test]
    fn rates_decrease_with_quantity() {
        for pair in ITEM_COUNT_TIERS.windows(2) {
            assert!(pair[1].regular_rate < pair[0].regular_rate);
            assert!(pair[1].accessory_rate < pair[0].accessory_rate);
        }
    }
}
