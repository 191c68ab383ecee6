pub mod engine;
pub mod tiers;

pub use engine::{AdditionalServices, FeeCalculationEngine, FeeLine};
