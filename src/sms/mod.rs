pub mod extract;
pub mod patterns;
pub mod reconciler;

pub use reconciler::BankSmsReconciler;
