pub mod workflow;

pub use workflow::{CheckoutItem, OrderPaymentWorkflow};
