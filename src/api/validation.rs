//! Explicit request validation, run before any domain command is built.
//! Each function returns a field -> message map so the request layer can
//! report every problem at once instead of failing on the first.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::currency::Currency;
use crate::database::models::PaymentGateway;
use crate::orders::CheckoutItem;
use crate::utils::Validator;

pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItemRequest {
    pub product_name: String,
    pub product_url: Option<String>,
    pub variant: Option<String>,
    pub unit_price: Decimal,
    pub currency: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItemRequest>,
}

pub fn validate_checkout(request: &CheckoutRequest) -> Result<Vec<CheckoutItem>, FieldErrors> {
    let mut errors = FieldErrors::new();
    if request.items.is_empty() {
        errors.insert("items".to_string(), "cart must not be empty".to_string());
        return Err(errors);
    }

    let mut items = Vec::with_capacity(request.items.len());
    for (index, item) in request.items.iter().enumerate() {
        let field = |name: &str| format!("items[{index}].{name}");
        if item.product_name.trim().is_empty() {
            errors.insert(field("product_name"), "must not be blank".to_string());
        }
        if !Validator::is_valid_amount(item.unit_price) {
            errors.insert(field("unit_price"), "must be a positive amount".to_string());
        }
        if item.quantity == 0 {
            errors.insert(field("quantity"), "must be at least 1".to_string());
        }
        match Currency::parse(&item.currency) {
            Some(currency) => items.push(CheckoutItem {
                product_name: item.product_name.clone(),
                product_url: item.product_url.clone(),
                variant: item.variant.clone(),
                unit_price: item.unit_price,
                currency,
                quantity: item.quantity,
            }),
            None => {
                errors.insert(
                    field("currency"),
                    format!("unknown currency '{}'", item.currency),
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(items)
    } else {
        Err(errors)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositInitiateRequest {
    pub amount: Decimal,
    pub gateway: String,
}

pub fn validate_deposit_initiate(
    request: &DepositInitiateRequest,
) -> Result<(Decimal, PaymentGateway), FieldErrors> {
    let mut errors = FieldErrors::new();
    if !Validator::is_valid_amount(request.amount) {
        errors.insert("amount".to_string(), "must be a positive amount".to_string());
    }
    let gateway = PaymentGateway::parse(&request.gateway);
    match gateway {
        Some(PaymentGateway::Wallet) | None => {
            errors.insert(
                "gateway".to_string(),
                format!("unknown gateway '{}'", request.gateway),
            );
        }
        Some(_) => {}
    }
    if let Some(gateway) = gateway {
        if errors.is_empty() {
            return Ok((request.amount, gateway));
        }
    }
    Err(errors)
}
