pub mod fee_cache;
pub mod settings;

pub use fee_cache::FeeConfigCache;
pub use settings::Settings;
