pub mod converter;
pub mod refresh;

pub use converter::{Currency, CurrencyConverter};
pub use refresh::{RateSource, StaticRateSource};
