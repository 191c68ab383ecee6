pub mod models;
pub mod operations;

pub use operations::Database;
